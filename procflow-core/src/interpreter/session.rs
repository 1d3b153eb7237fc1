//! Prompt rendering and turn-stream accounting for the session protocol.

use super::state::Binding;
use crate::ast::AgentDef;
use crate::event::{AgentEvent, Usage};
use std::collections::HashSet;
use std::fmt::Write;

const RESULT_OPEN: &str = "<result>";
const RESULT_CLOSE: &str = "</result>";

/// Instructions appended to every prompt
pub const EVENT_PROTOCOL: &str = "\
Report progress by writing events inline, one JSON object per marker:
<event>{\"type\":\"step\",\"status\":\"started\",\"name\":\"...\"}</event>
Event types: log, step, todo, artifact, file, checkpoint, result_text.
Binding contents are not included above; read them through their references.
Wrap your final answer in result tags.";

/// Build the prompt for one session statement
pub fn render_prompt(title: &str, agent: &AgentDef, bindings: &[Binding]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Task\n{}\n", title);

    if let Some(prompt) = agent.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        let _ = writeln!(out, "# Agent: {}\n{}\n", agent.name, prompt.trim_end());
    }

    out.push_str("# Bindings\n");
    if bindings.is_empty() {
        out.push_str("(none)\n");
    }
    for b in bindings {
        let _ = write!(out, "- {} ({}): {}", b.name, b.kind.as_str(), b.content_ref);
        if let Some(sha) = &b.sha256 {
            let _ = write!(out, " sha256={}", sha);
        }
        if let Some(size) = b.size {
            let _ = write!(out, " size={}", size);
        }
        out.push('\n');
    }

    let _ = write!(out, "\n# Event protocol\n{}\n", EVENT_PROTOCOL);
    out
}

/// Text between the first `<result>` and the following `</result>`
pub fn extract_result(text: &str) -> Option<&str> {
    let start = text.find(RESULT_OPEN)? + RESULT_OPEN.len();
    let end = text[start..].find(RESULT_CLOSE)? + start;
    Some(text[start..end].trim())
}

/// Running totals for one drained stream
#[derive(Debug, Default)]
pub struct StreamTally {
    pub text: String,
    pub result_text: Option<String>,
    pub usage: Usage,
    seen_messages: HashSet<String>,
    seen_artifacts: HashSet<String>,
}

impl StreamTally {
    /// Count usage once per message id; returns whether it was counted
    pub fn record_usage(&mut self, usage: &Usage) -> bool {
        if let Some(id) = &usage.message_id {
            if !self.seen_messages.insert(id.clone()) {
                return false;
            }
        }
        self.usage.accumulate(usage);
        true
    }

    /// Whether an event should be forwarded; repeated artifacts are not
    pub fn admit(&mut self, event: &AgentEvent) -> bool {
        if let AgentEvent::ResultText { text } = event {
            if self.result_text.is_none() {
                self.result_text = Some(text.clone());
            }
        }
        match event.artifact_key() {
            Some(key) => self.seen_artifacts.insert(key.to_string()),
            None => true,
        }
    }

    /// The session's result: an explicit `result_text` event, else the
    /// `<result>` span, else the whole text
    pub fn final_result(&self) -> String {
        if let Some(text) = &self.result_text {
            return text.clone();
        }
        match extract_result(&self.text) {
            Some(span) => span.to_string(),
            None => self.text.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::state::BindingKind;

    #[test]
    fn test_prompt_lists_references_not_content() {
        let mut agent = AgentDef::new("captain");
        agent.prompt = Some("Be helpful".into());
        let bindings = vec![Binding {
            name: "draft".into(),
            kind: BindingKind::Let,
            content_ref: "mem://runs/r/bindings/draft/1.txt".into(),
            preview: "secret body".into(),
            summary: None,
            sha256: Some("abc".into()),
            size: Some(11),
            mime: Some("text/plain".into()),
        }];

        let prompt = render_prompt("Review", &agent, &bindings);
        assert!(prompt.starts_with("# Task\nReview\n"));
        assert!(prompt.contains("# Agent: captain\nBe helpful\n"));
        assert!(prompt.contains("- draft (let): mem://runs/r/bindings/draft/1.txt sha256=abc size=11\n"));
        assert!(!prompt.contains("secret body"));
        assert!(prompt.contains(EVENT_PROTOCOL));
    }

    #[test]
    fn test_result_precedence() {
        let mut tally = StreamTally::default();
        tally.text = "  chatter <result> answer </result> more ".into();
        assert_eq!(tally.final_result(), "answer");

        tally.admit(&AgentEvent::ResultText { text: "explicit".into() });
        tally.admit(&AgentEvent::ResultText { text: "later".into() });
        assert_eq!(tally.final_result(), "explicit");

        let plain = StreamTally {
            text: "  just text \n".into(),
            ..Default::default()
        };
        assert_eq!(plain.final_result(), "just text");
    }

    #[test]
    fn test_usage_counted_once_per_message() {
        let mut tally = StreamTally::default();
        assert!(tally.record_usage(&Usage::new(10, 5).with_message_id("m1")));
        assert!(!tally.record_usage(&Usage::new(10, 5).with_message_id("m1")));
        assert!(tally.record_usage(&Usage::new(1, 1)));
        assert!(tally.record_usage(&Usage::new(1, 1)));
        assert_eq!(tally.usage.total_tokens(), 19);
    }

    #[test]
    fn test_artifacts_deduplicated_by_key() {
        let mut tally = StreamTally::default();
        let artifact = |name: &str, path: Option<&str>| AgentEvent::Artifact {
            name: Some(name.into()),
            path: path.map(str::to_string),
            content_ref: None,
            mime: None,
        };
        assert!(tally.admit(&artifact("report", Some("out/r.md"))));
        assert!(!tally.admit(&artifact("other name", Some("out/r.md"))));
        assert!(tally.admit(&artifact("report", None)));
        assert!(tally.admit(&AgentEvent::Thinking { text: "t".into() }));
    }
}
