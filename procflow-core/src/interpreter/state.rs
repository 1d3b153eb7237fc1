//! Per-run state: bindings, outputs and diagnostic counters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Characters kept in a binding preview
pub const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    Input,
    Let,
    Const,
    Output,
}

impl BindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingKind::Input => "input",
            BindingKind::Let => "let",
            BindingKind::Const => "const",
            BindingKind::Output => "output",
        }
    }
}

/// A named result, stored by reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub name: String,
    pub kind: BindingKind,
    pub content_ref: String,
    pub preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

/// First [`PREVIEW_CHARS`] characters of `text`
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub statements: u64,
    pub sessions_created: u64,
    pub sessions_resumed: u64,
    pub bindings_written: u64,
    pub events_forwarded: u64,
}

/// Bindings and outputs of one run.
///
/// Writing a name again replaces the earlier binding (last write wins)
/// and moves it to the end of the scope order.
#[derive(Debug, Default)]
pub struct RuntimeState {
    pub run_id: String,
    pub program_hash: String,
    bindings: Vec<Binding>,
    values: HashMap<String, String>,
    outputs: Vec<String>,
}

impl RuntimeState {
    pub fn new(run_id: impl Into<String>, program_hash: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            program_hash: program_hash.into(),
            ..Default::default()
        }
    }

    pub fn bind(&mut self, binding: Binding, text: String) {
        let name = binding.name.clone();
        self.bindings.retain(|b| b.name != name);
        self.outputs.retain(|n| *n != name);
        if binding.kind == BindingKind::Output {
            self.outputs.push(name.clone());
        }
        self.bindings.push(binding);
        self.values.insert(name, text);
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    /// Text of a binding
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Every binding in scope, in write order
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Output bindings in the order they were (last) written
    pub fn outputs(&self) -> Vec<Binding> {
        self.outputs
            .iter()
            .filter_map(|name| self.binding(name).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(name: &str, kind: BindingKind, content_ref: &str) -> Binding {
        Binding {
            name: name.into(),
            kind,
            content_ref: content_ref.into(),
            preview: String::new(),
            summary: None,
            sha256: None,
            size: None,
            mime: None,
        }
    }

    #[test]
    fn test_last_write_wins() {
        let mut state = RuntimeState::new("r", "h");
        state.bind(binding("x", BindingKind::Output, "mem://1"), "a".into());
        state.bind(binding("y", BindingKind::Output, "mem://2"), "c".into());
        state.bind(binding("x", BindingKind::Output, "mem://3"), "b".into());

        assert_eq!(state.bindings().len(), 2);
        assert_eq!(state.value("x"), Some("b"));
        assert_eq!(state.binding("x").unwrap().content_ref, "mem://3");

        let outputs: Vec<String> = state.outputs().into_iter().map(|b| b.name).collect();
        assert_eq!(outputs, vec!["y", "x"]);
    }

    #[test]
    fn test_let_does_not_become_output() {
        let mut state = RuntimeState::new("r", "h");
        state.bind(binding("x", BindingKind::Output, "mem://1"), "a".into());
        state.bind(binding("x", BindingKind::Let, "mem://2"), "b".into());
        assert!(state.outputs().is_empty());
    }

    #[test]
    fn test_preview_counts_chars() {
        let text = "é".repeat(300);
        assert_eq!(preview(&text).chars().count(), PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }
}
