//! Translation of backend shapes into the closed event vocabulary.
//!
//! Two shapes are handled here:
//! - inline markers an agent writes into its reply text, one JSON event
//!   per `<event>…</event>` span
//! - tool-use blocks, mapped onto file and todo events by tool name

use crate::event::{AgentEvent, FileOp, LogLevel, TodoAction};
use serde_json::Value;

const OPEN: &str = "<event>";
const CLOSE: &str = "</event>";

/// Extract every inline event marker from `text`.
///
/// A marker whose body is not a valid event becomes a `raw` event carrying
/// the body (parsed JSON if possible, the text otherwise).
pub fn parse_inline_events(text: &str) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else {
            break;
        };
        let body = after[..end].trim();
        let event = match serde_json::from_str::<AgentEvent>(body) {
            Ok(event) => event,
            Err(_) => match serde_json::from_str::<Value>(body) {
                Ok(value) => AgentEvent::raw(value),
                Err(_) => AgentEvent::raw(body.to_string()),
            },
        };
        events.push(event);
        rest = &after[end + CLOSE.len()..];
    }

    events
}

/// Map one tool invocation onto events
pub fn translate_tool_use(name: &str, input: &Value) -> Vec<AgentEvent> {
    let path = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| input.get(*k).and_then(Value::as_str))
            .map(str::to_string)
    };
    let file = |op: FileOp| -> Vec<AgentEvent> {
        match path(&["file_path", "path", "source"]) {
            Some(path) => vec![AgentEvent::File { op, path, to: None }],
            None => vec![AgentEvent::log(LogLevel::Debug, format!("tool {} without a path", name))],
        }
    };
    let transfer = |op: FileOp| -> Vec<AgentEvent> {
        match (path(&["source", "from", "path"]), path(&["destination", "to"])) {
            (Some(path), to) => vec![AgentEvent::File { op, path, to }],
            (None, _) => vec![AgentEvent::log(LogLevel::Debug, format!("tool {} without a path", name))],
        }
    };

    match name {
        "Read" | "read_file" => file(FileOp::Read),
        "Open" | "open_file" => file(FileOp::Opened),
        "Write" | "write_file" | "create_file" => file(FileOp::Created),
        "Edit" | "MultiEdit" | "edit_file" => file(FileOp::Edited),
        "Delete" | "delete_file" => file(FileOp::Deleted),
        "Move" | "move_file" => transfer(FileOp::Moved),
        "Copy" | "copy_file" => transfer(FileOp::Copied),
        "Mkdir" | "create_directory" => file(FileOp::Mkdir),
        "Rmdir" | "remove_directory" => file(FileOp::Rmdir),
        "TodoWrite" => input
            .get("todos")
            .and_then(Value::as_array)
            .map(|todos| todos.iter().enumerate().map(|(i, todo)| todo_event(i, todo)).collect())
            .unwrap_or_default(),
        other => vec![AgentEvent::log(LogLevel::Info, format!("tool {}", other))],
    }
}

fn todo_event(index: usize, todo: &Value) -> AgentEvent {
    let action = match todo.get("status").and_then(Value::as_str) {
        Some("completed") => TodoAction::Complete,
        Some("in_progress") => TodoAction::Update,
        _ => TodoAction::Add,
    };
    let id = todo
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| (index + 1).to_string());
    AgentEvent::Todo {
        action,
        id,
        text: todo
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::StepStatus;
    use serde_json::json;

    #[test]
    fn test_inline_markers() {
        let text = "working\n<event>{\"type\":\"step\",\"status\":\"started\",\"name\":\"plan\"}</event>\n\
                    <event>{\"type\":\"mystery\"}</event> and <event>not json</event> <event>unclosed";
        let events = parse_inline_events(text);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            AgentEvent::Step {
                status: StepStatus::Started,
                name: "plan".into(),
                detail: None
            }
        );
        assert_eq!(events[1], AgentEvent::raw(json!({"type": "mystery"})));
        assert_eq!(events[2], AgentEvent::raw("not json"));
    }

    #[test]
    fn test_file_tools() {
        assert_eq!(
            translate_tool_use("Edit", &json!({"file_path": "src/lib.rs"})),
            vec![AgentEvent::File { op: FileOp::Edited, path: "src/lib.rs".into(), to: None }]
        );
        assert_eq!(
            translate_tool_use("move_file", &json!({"source": "a", "destination": "b"})),
            vec![AgentEvent::File { op: FileOp::Moved, path: "a".into(), to: Some("b".into()) }]
        );
    }

    #[test]
    fn test_todo_tool() {
        let events = translate_tool_use(
            "TodoWrite",
            &json!({"todos": [
                {"content": "plan", "status": "completed"},
                {"id": "t2", "content": "build", "status": "in_progress"}
            ]}),
        );
        assert_eq!(
            events,
            vec![
                AgentEvent::Todo { action: TodoAction::Complete, id: "1".into(), text: Some("plan".into()) },
                AgentEvent::Todo { action: TodoAction::Update, id: "t2".into(), text: Some("build".into()) },
            ]
        );
    }

    #[test]
    fn test_unknown_tool_is_logged() {
        let events = translate_tool_use("WebSearch", &json!({}));
        assert_eq!(events, vec![AgentEvent::log(LogLevel::Info, "tool WebSearch")]);
    }
}
