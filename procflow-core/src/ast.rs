//! # Program model
//!
//! The statement and expression vocabulary produced by the parser and
//! walked by the interpreter. A `Program` is immutable once parsed and
//! serializes to JSON so it can be stored or inspected alongside a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name used for sessions that do not reference a declared agent
pub const DEFAULT_AGENT: &str = "default";

/// A parsed process program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Leading comment lines, verbatim (without the `#`)
    #[serde(default)]
    pub header: Vec<String>,
    /// Agent definitions by name
    #[serde(default)]
    pub agents: BTreeMap<String, AgentDef>,
    /// Top-level statements in source order
    #[serde(default)]
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn agent(&self, name: &str) -> Option<&AgentDef> {
        self.agents.get(name)
    }
}

/// An `agent <name>:` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// System prompt text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Persistence policy string, e.g. `true` or `project`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist: Option<String>,
}

impl AgentDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The agent used by bare `session "..."` statements
    pub fn default_agent() -> Self {
        Self::new(DEFAULT_AGENT)
    }

    /// Whether session continuity is enabled for this agent.
    ///
    /// Any policy string is truthy except empty, `false`, `no`, `off`, `0`
    /// and `none`.
    pub fn persists(&self) -> bool {
        match self.persist.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(policy) => !matches!(
                policy.to_ascii_lowercase().as_str(),
                "false" | "no" | "off" | "0" | "none"
            ),
        }
    }
}

/// Failure policy of a `parallel` block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Wait for every branch, then raise the first failure
    #[default]
    FailFast,
    /// Wait for every branch, then raise the first failure
    Continue,
    /// Wait for every branch, never raise
    Ignore,
}

impl FailurePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fail-fast" => Some(FailurePolicy::FailFast),
            "continue" => Some(FailurePolicy::Continue),
            "ignore" => Some(FailurePolicy::Ignore),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail-fast",
            FailurePolicy::Continue => "continue",
            FailurePolicy::Ignore => "ignore",
        }
    }
}

/// A session or resume call, shared by statements and expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCall {
    /// Agent name; `None` selects the default agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Task title sent to the agent
    pub title: String,
}

impl SessionCall {
    pub fn new(agent: Option<&str>, title: impl Into<String>) -> Self {
        Self {
            agent: agent.map(str::to_string),
            title: title.into(),
        }
    }

    pub fn agent_name(&self) -> &str {
        self.agent.as_deref().unwrap_or(DEFAULT_AGENT)
    }
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    /// A quoted string literal
    Str { value: String },
    /// A reference to a bound variable
    Var { name: String },
    /// `session "title"` used as a value
    Session(SessionCall),
    /// `resume: agent "title"` used as a value
    Resume(SessionCall),
}

/// One branch of a `parallel` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Binding name for `name = <stmt>` branches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub stmt: Stmt,
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Stmt {
    Session(SessionCall),
    Resume(SessionCall),
    Let {
        name: String,
        value: Expr,
    },
    Output {
        name: String,
        value: Expr,
    },
    Try {
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        catch_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        catch_body: Option<Vec<Stmt>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finally_body: Option<Vec<Stmt>>,
    },
    Parallel {
        #[serde(default)]
        policy: FailurePolicy,
        branches: Vec<Branch>,
    },
    Repeat {
        count: u32,
        body: Vec<Stmt>,
    },
    Comment {
        text: String,
    },
}

impl Stmt {
    /// Short label used in logs and diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            Stmt::Session(_) => "session",
            Stmt::Resume(_) => "resume",
            Stmt::Let { .. } => "let",
            Stmt::Output { .. } => "output",
            Stmt::Try { .. } => "try",
            Stmt::Parallel { .. } => "parallel",
            Stmt::Repeat { .. } => "repeat",
            Stmt::Comment { .. } => "comment",
        }
    }
}
