//! # Program parser
//!
//! Turns program source into a [`Program`]. The format is line oriented and
//! indentation sensitive (two spaces per level):
//!
//! ```text
//! # Release notes
//! agent writer:
//!   model: sonnet
//!   persist: true
//!   prompt: """
//!     You write release notes.
//!   """
//! let draft = session: writer "Draft the notes"
//! try:
//!   resume: writer "Tighten the draft"
//! catch as err:
//!   let failure = err
//! parallel(on-fail: continue):
//!   a = session "Review A"
//!   b = session "Review B"
//! repeat 2:
//!   session "Polish"
//! output notes = draft
//! ```
//!
//! Parsing is all-or-nothing: any malformed line yields a `ParseFailed`
//! error naming the line and no partial program is returned.

use crate::ast::{AgentDef, Branch, Expr, FailurePolicy, Program, SessionCall, Stmt};
use crate::error::{self, Result};
use std::collections::BTreeMap;

const INDENT_STEP: usize = 2;
const TRIPLE_QUOTE: &str = "\"\"\"";

/// Parse program source text
pub fn parse(source: &str) -> Result<Program> {
    let lines = preprocess(source)?;
    Parser::new(lines).parse_program()
}

// ============================================================================
// Line preprocessing
// ============================================================================

#[derive(Debug, Clone)]
struct Line {
    number: usize,
    indent: usize,
    text: String,
    comment: bool,
    /// Raw lines of a `"""` block opened at the end of this line
    block: Option<Vec<String>>,
}

fn preprocess(source: &str) -> Result<Vec<Line>> {
    let mut lines = Vec::new();
    let mut raw = source.lines().enumerate();

    while let Some((idx, line)) = raw.next() {
        let number = idx + 1;
        let stripped = line.trim_end();
        if stripped.trim().is_empty() {
            continue;
        }

        let indent = stripped.len() - stripped.trim_start_matches(' ').len();
        if stripped[indent..].starts_with('\t') {
            return Err(error::parse_error(number, "tabs are not allowed in indentation"));
        }

        let body = &stripped[indent..];
        if body.starts_with('#') {
            lines.push(Line {
                number,
                indent,
                text: body.to_string(),
                comment: true,
                block: None,
            });
            continue;
        }

        let text = strip_comment(body).trim_end().to_string();
        let block = if opens_block(&text) {
            let mut block = Vec::new();
            let mut closed = false;
            for (_, inner) in raw.by_ref() {
                if inner.trim() == TRIPLE_QUOTE {
                    closed = true;
                    break;
                }
                block.push(inner.trim_end().to_string());
            }
            if !closed {
                return Err(error::parse_error(number, "unterminated \"\"\" block"));
            }
            Some(block)
        } else {
            None
        };

        lines.push(Line {
            number,
            indent,
            text,
            comment: false,
            block,
        });
    }

    Ok(lines)
}

/// Remove a trailing `#` comment that sits outside string literals
fn strip_comment(text: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match c {
            '\\' if in_string && !escaped => {
                escaped = true;
                continue;
            }
            '"' if !escaped => in_string = !in_string,
            '#' if !in_string => return &text[..i],
            _ => {}
        }
        escaped = false;
    }
    text
}

fn opens_block(text: &str) -> bool {
    text.ends_with(TRIPLE_QUOTE) && text.matches(TRIPLE_QUOTE).count() % 2 == 1
}

/// Strip the common leading indentation of a `"""` block
fn dedent(lines: &[String]) -> String {
    // Only ASCII spaces count as indentation, so byte offsets stay on char
    // boundaries.
    let spaces = |l: &str| l.len() - l.trim_start_matches(' ').len();
    let margin = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| spaces(l))
        .min()
        .unwrap_or(0);

    let body: Vec<&str> = lines.iter().map(|l| &l[spaces(l).min(margin)..]).collect();
    body.join("\n").trim_matches('\n').to_string()
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    lines: Vec<Line>,
    pos: usize,
    agents: BTreeMap<String, AgentDef>,
}

impl Parser {
    fn new(lines: Vec<Line>) -> Self {
        Self {
            lines,
            pos: 0,
            agents: BTreeMap::new(),
        }
    }

    fn parse_program(mut self) -> Result<Program> {
        let mut header = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if !line.comment {
                break;
            }
            header.push(line.text.clone());
            self.pos += 1;
        }

        let statements = self.parse_block(0, true)?;
        Ok(Program {
            header,
            agents: self.agents,
            statements,
        })
    }

    /// Index of the next non-comment line, without consuming anything
    fn peek_code(&self) -> Option<usize> {
        (self.pos..self.lines.len()).find(|&i| !self.lines[i].comment)
    }

    fn parse_block(&mut self, indent: usize, top_level: bool) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();

        while let Some(line) = self.lines.get(self.pos) {
            if line.comment {
                if line.indent < indent {
                    break;
                }
                if line.indent == indent {
                    stmts.push(Stmt::Comment {
                        text: line.text.trim_start_matches('#').trim().to_string(),
                    });
                }
                self.pos += 1;
                continue;
            }
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(error::bad_indent(line.number, indent, line.indent));
            }

            if line.text.starts_with("agent ") {
                if !top_level {
                    return Err(error::parse_error(
                        line.number,
                        "agent definitions are only allowed at the top level",
                    ));
                }
                self.parse_agent()?;
                continue;
            }

            let stmt = self.parse_statement(indent)?;
            stmts.push(stmt);
        }

        Ok(stmts)
    }

    /// Parse the nested block that must follow a `...:` header line
    fn parse_body(&mut self, header: &Line) -> Result<Vec<Stmt>> {
        let expected = header.indent + INDENT_STEP;
        match self.peek_code().map(|i| &self.lines[i]) {
            Some(next) if next.indent > header.indent => {
                if next.indent != expected {
                    return Err(error::bad_indent(next.number, expected, next.indent));
                }
                self.parse_block(expected, false)
            }
            _ => Err(error::parse_error(
                header.number,
                format!("expected an indented block after '{}'", header.text),
            )),
        }
    }

    fn next_line(&mut self) -> Line {
        let line = self.lines[self.pos].clone();
        self.pos += 1;
        line
    }

    fn parse_statement(&mut self, indent: usize) -> Result<Stmt> {
        let line = self.next_line();
        let text = line.text.as_str();

        if text == "try:" {
            return self.parse_try(&line, indent);
        }
        if text.starts_with("catch") || text == "finally:" {
            return Err(error::parse_error(
                line.number,
                format!("'{}' without a preceding try", text),
            ));
        }
        if text.starts_with("parallel") && text.ends_with(':') {
            let policy = parse_policy(&line)?;
            let branches = self.parse_branches(&line)?;
            return Ok(Stmt::Parallel { policy, branches });
        }
        if let Some(rest) = text.strip_prefix("repeat ") {
            let count = rest
                .strip_suffix(':')
                .map(str::trim)
                .and_then(|n| n.parse::<u32>().ok())
                .ok_or_else(|| {
                    error::parse_error(line.number, "repeat count must be a literal integer")
                })?;
            let body = self.parse_body(&line)?;
            return Ok(Stmt::Repeat { count, body });
        }
        if text.ends_with(':') && !text.contains('"') {
            return Err(error::parse_error(
                line.number,
                format!("unknown block '{}'", text),
            ));
        }

        parse_simple(text, line.number)
    }

    fn parse_try(&mut self, line: &Line, indent: usize) -> Result<Stmt> {
        let body = self.parse_body(line)?;

        let mut catch_name = None;
        let mut catch_body = None;
        if let Some(idx) = self.peek_code() {
            let next = &self.lines[idx];
            if next.indent == indent && next.text.starts_with("catch") {
                let clause = next.text.clone();
                self.pos = idx;
                let catch_line = self.next_line();
                catch_name = match clause.as_str() {
                    "catch:" => None,
                    other => {
                        let name = other
                            .strip_prefix("catch as ")
                            .and_then(|r| r.strip_suffix(':'))
                            .map(str::trim)
                            .filter(|n| is_ident(n))
                            .ok_or_else(|| {
                                error::parse_error(
                                    catch_line.number,
                                    "expected 'catch:' or 'catch as <name>:'",
                                )
                            })?;
                        Some(name.to_string())
                    }
                };
                catch_body = Some(self.parse_body(&catch_line)?);
            }
        }

        let mut finally_body = None;
        if let Some(idx) = self.peek_code() {
            let next = &self.lines[idx];
            if next.indent == indent && next.text == "finally:" {
                self.pos = idx;
                let finally_line = self.next_line();
                finally_body = Some(self.parse_body(&finally_line)?);
            }
        }

        if catch_body.is_none() && finally_body.is_none() {
            return Err(error::parse_error(
                line.number,
                "try needs a catch or finally clause",
            ));
        }

        Ok(Stmt::Try {
            body,
            catch_name,
            catch_body,
            finally_body,
        })
    }

    fn parse_branches(&mut self, header: &Line) -> Result<Vec<Branch>> {
        let indent = header.indent + INDENT_STEP;
        match self.peek_code().map(|i| &self.lines[i]) {
            Some(next) if next.indent > header.indent && next.indent != indent => {
                return Err(error::bad_indent(next.number, indent, next.indent));
            }
            Some(next) if next.indent == indent => {}
            _ => {
                return Err(error::parse_error(
                    header.number,
                    "parallel needs at least one branch",
                ))
            }
        }

        let mut branches = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.comment {
                if line.indent < indent {
                    break;
                }
                self.pos += 1;
                continue;
            }
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(error::bad_indent(line.number, indent, line.indent));
            }

            if let Some((name, rest)) = split_named_branch(&line.text) {
                let number = line.number;
                self.pos += 1;
                let branch = if rest.starts_with("session") || rest.starts_with("resume:") {
                    Branch {
                        name: Some(name.to_string()),
                        stmt: parse_simple(rest, number)?,
                    }
                } else {
                    Branch {
                        name: None,
                        stmt: Stmt::Let {
                            name: name.to_string(),
                            value: parse_expr(rest, number)?,
                        },
                    }
                };
                branches.push(branch);
            } else {
                let stmt = self.parse_statement(indent)?;
                branches.push(Branch { name: None, stmt });
            }
        }

        Ok(branches)
    }

    fn parse_agent(&mut self) -> Result<()> {
        let line = self.next_line();
        let name = line
            .text
            .strip_prefix("agent ")
            .and_then(|r| r.strip_suffix(':'))
            .map(str::trim)
            .filter(|n| is_ident(n))
            .ok_or_else(|| error::parse_error(line.number, "expected 'agent <name>:'"))?
            .to_string();

        if self.agents.contains_key(&name) {
            return Err(error::parse_error(
                line.number,
                format!("agent '{}' is defined twice", name),
            ));
        }

        let mut agent = AgentDef::new(&name);
        let indent = line.indent + INDENT_STEP;
        while let Some(prop) = self.lines.get(self.pos) {
            if prop.comment {
                if prop.indent < indent {
                    break;
                }
                self.pos += 1;
                continue;
            }
            if prop.indent <= line.indent {
                break;
            }
            if prop.indent != indent {
                return Err(error::bad_indent(prop.number, indent, prop.indent));
            }

            let prop = self.next_line();
            let (key, value) = prop
                .text
                .split_once(':')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| error::parse_error(prop.number, "expected '<property>: <value>'"))?;

            match key {
                "model" => agent.model = Some(parse_scalar(value, prop.number)?),
                "persist" => agent.persist = Some(parse_scalar(value, prop.number)?),
                "prompt" => agent.prompt = Some(parse_prompt(value, &prop)?),
                other => {
                    return Err(error::parse_error(
                        prop.number,
                        format!("unknown agent property '{}'", other),
                    ))
                }
            }
        }

        self.agents.insert(name, agent);
        Ok(())
    }
}

// ============================================================================
// Single-line forms
// ============================================================================

fn parse_policy(line: &Line) -> Result<FailurePolicy> {
    let head = line.text.trim_end_matches(':');
    if head == "parallel" {
        return Ok(FailurePolicy::default());
    }

    head.strip_prefix("parallel(")
        .and_then(|r| r.strip_suffix(')'))
        .and_then(|r| r.trim().strip_prefix("on-fail:"))
        .and_then(|p| FailurePolicy::parse(p.trim()))
        .ok_or_else(|| {
            error::parse_error(
                line.number,
                "expected 'parallel(on-fail: fail-fast|continue|ignore):'",
            )
        })
}

fn parse_simple(text: &str, number: usize) -> Result<Stmt> {
    if let Some(rest) = text.strip_prefix("let ") {
        let (name, value) = parse_assignment(rest, number)?;
        return Ok(Stmt::Let { name, value });
    }
    if let Some(rest) = text.strip_prefix("output ") {
        let (name, value) = parse_assignment(rest, number)?;
        return Ok(Stmt::Output { name, value });
    }
    if text.starts_with("session") {
        return parse_call(text, number, "session").map(Stmt::Session);
    }
    if text.starts_with("resume") {
        return parse_call(text, number, "resume").map(Stmt::Resume);
    }

    Err(error::parse_error(
        number,
        format!("unrecognized statement '{}'", text),
    ))
}

fn parse_assignment(rest: &str, number: usize) -> Result<(String, Expr)> {
    let (name, value) = rest
        .split_once('=')
        .map(|(n, v)| (n.trim(), v.trim()))
        .ok_or_else(|| error::parse_error(number, "expected '<name> = <expr>'"))?;
    if !is_ident(name) {
        return Err(error::parse_error(
            number,
            format!("invalid binding name '{}'", name),
        ));
    }
    Ok((name.to_string(), parse_expr(value, number)?))
}

fn parse_expr(text: &str, number: usize) -> Result<Expr> {
    if text.starts_with('"') {
        let (value, rest) = parse_string(text, number)?;
        if !rest.trim().is_empty() {
            return Err(error::parse_error(number, "unexpected text after string"));
        }
        return Ok(Expr::Str { value });
    }
    if text.starts_with("session ") || text.starts_with("session:") {
        return parse_call(text, number, "session").map(Expr::Session);
    }
    if text.starts_with("resume:") {
        return parse_call(text, number, "resume").map(Expr::Resume);
    }
    if is_ident(text) {
        return Ok(Expr::Var {
            name: text.to_string(),
        });
    }

    Err(error::parse_error(
        number,
        format!("invalid expression '{}'", text),
    ))
}

/// `session "t"`, `session: agent "t"` or `resume: agent "t"`
fn parse_call(text: &str, number: usize, keyword: &str) -> Result<SessionCall> {
    let rest = text[keyword.len()..].trim_start();

    let (agent, rest) = match rest.strip_prefix(':') {
        Some(after) => {
            let after = after.trim_start();
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            let agent = &after[..end];
            if !is_ident(agent) {
                return Err(error::parse_error(
                    number,
                    format!("expected an agent name after '{}:'", keyword),
                ));
            }
            (Some(agent), after[end..].trim_start())
        }
        None if keyword == "resume" => {
            return Err(error::parse_error(number, "expected 'resume: <agent> \"<title>\"'"));
        }
        None => (None, rest),
    };

    if !rest.starts_with('"') {
        return Err(error::parse_error(
            number,
            format!("expected a quoted title after '{}'", keyword),
        ));
    }
    let (title, trailing) = parse_string(rest, number)?;
    if !trailing.trim().is_empty() {
        return Err(error::parse_error(number, "unexpected text after title"));
    }

    Ok(SessionCall::new(agent, title))
}

/// Parse a leading double-quoted string; returns the value and the remainder
fn parse_string(text: &str, number: usize) -> Result<(String, &str)> {
    let mut out = String::new();
    let mut chars = text.char_indices().skip(1);

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((out, &text[i + 1..])),
            '\\' => match chars.next().map(|(_, e)| e) {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            other => out.push(other),
        }
    }

    Err(error::parse_error(number, "unterminated string literal"))
}

/// Property values may be quoted or bare
fn parse_scalar(value: &str, number: usize) -> Result<String> {
    if value.starts_with('"') {
        let (value, rest) = parse_string(value, number)?;
        if !rest.trim().is_empty() {
            return Err(error::parse_error(number, "unexpected text after string"));
        }
        return Ok(value);
    }
    if value.is_empty() {
        return Err(error::parse_error(number, "property value is empty"));
    }
    Ok(value.to_string())
}

fn parse_prompt(value: &str, line: &Line) -> Result<String> {
    if let Some(block) = &line.block {
        if value != TRIPLE_QUOTE {
            return Err(error::parse_error(
                line.number,
                "text is not allowed after an opening \"\"\"",
            ));
        }
        return Ok(dedent(block));
    }
    if let Some(inner) = value
        .strip_prefix(TRIPLE_QUOTE)
        .and_then(|v| v.strip_suffix(TRIPLE_QUOTE))
    {
        return Ok(inner.to_string());
    }
    parse_scalar(value, line.number)
}

/// `name = rest` at the start of a parallel branch
fn split_named_branch(text: &str) -> Option<(&str, &str)> {
    let (name, rest) = text.split_once('=')?;
    let name = name.trim();
    if !is_ident(name) || matches!(name, "let" | "output") {
        return None;
    }
    Some((name, rest.trim()))
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SAMPLE: &str = r#"agent captain:
  model: sonnet
  prompt: "Be helpful"
try:
  session "Step 1"
catch as err:
  let failure = err
parallel(on-fail: continue):
  a = session "Branch A"
  b = session "Branch B"
repeat 3:
  session "Loop"
"#;

    #[test]
    fn test_parse_sample_structure() {
        let program = parse(SAMPLE).unwrap();

        assert_eq!(program.statements.len(), 3);
        assert_eq!(program.statements[0].label(), "try");
        assert_eq!(program.statements[1].label(), "parallel");
        assert_eq!(program.statements[2].label(), "repeat");

        let captain = program.agent("captain").unwrap();
        assert_eq!(captain.prompt.as_deref(), Some("Be helpful"));
        assert_eq!(captain.model.as_deref(), Some("sonnet"));
    }

    #[test]
    fn test_parse_try_catch_details() {
        let program = parse(SAMPLE).unwrap();
        match &program.statements[0] {
            Stmt::Try {
                body,
                catch_name,
                catch_body,
                finally_body,
            } => {
                assert_eq!(body, &vec![Stmt::Session(SessionCall::new(None, "Step 1"))]);
                assert_eq!(catch_name.as_deref(), Some("err"));
                assert_eq!(
                    catch_body.as_ref().unwrap()[0],
                    Stmt::Let {
                        name: "failure".into(),
                        value: Expr::Var { name: "err".into() },
                    }
                );
                assert!(finally_body.is_none());
            }
            other => panic!("expected try, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_parallel_branches() {
        let program = parse(SAMPLE).unwrap();
        match &program.statements[1] {
            Stmt::Parallel { policy, branches } => {
                assert_eq!(*policy, FailurePolicy::Continue);
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[0].name.as_deref(), Some("a"));
                assert_eq!(
                    branches[1].stmt,
                    Stmt::Session(SessionCall::new(None, "Branch B"))
                );
            }
            other => panic!("expected parallel, got {:?}", other),
        }
    }

    #[test]
    fn test_parallel_default_policy_and_bare_branches() {
        let source = "parallel:\n  session \"one\"\n  x = \"literal\"\n  try:\n    session \"two\"\n  finally:\n    session \"three\"\n";
        let program = parse(source).unwrap();
        match &program.statements[0] {
            Stmt::Parallel { policy, branches } => {
                assert_eq!(*policy, FailurePolicy::FailFast);
                assert_eq!(branches.len(), 3);
                assert!(branches[0].name.is_none());
                assert_eq!(
                    branches[1].stmt,
                    Stmt::Let {
                        name: "x".into(),
                        value: Expr::Str { value: "literal".into() },
                    }
                );
                assert_eq!(branches[2].stmt.label(), "try");
            }
            other => panic!("expected parallel, got {:?}", other),
        }
    }

    #[test]
    fn test_repeat_count() {
        let program = parse("repeat 4:\n  session \"Loop\"\n").unwrap();
        assert!(matches!(program.statements[0], Stmt::Repeat { count: 4, .. }));

        let err = parse("repeat n:\n  session \"Loop\"\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
    }

    #[test]
    fn test_bad_indent_names_line() {
        let err = parse("try:\n   session \"x\"\ncatch:\n  session \"y\"\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
        assert!(err.message().contains("bad indent"));
        assert!(err.message().starts_with("line 2:"));
    }

    #[test]
    fn test_over_indented_statement() {
        let err = parse("session \"a\"\n  session \"b\"\n").unwrap_err();
        assert!(err.message().contains("line 2"));
        assert!(err.message().contains("bad indent"));
    }

    #[test]
    fn test_comments_and_header() {
        let source = "# Title line\n# second\n\nsession \"a\"  # trailing\n# between\nlet x = \"has # inside\"\n";
        let program = parse(source).unwrap();
        assert_eq!(program.header, vec!["# Title line", "# second"]);
        assert_eq!(program.statements.len(), 3);
        assert_eq!(program.statements[1], Stmt::Comment { text: "between".into() });
        assert_eq!(
            program.statements[2],
            Stmt::Let {
                name: "x".into(),
                value: Expr::Str { value: "has # inside".into() },
            }
        );
    }

    #[test]
    fn test_multiline_prompt_keeps_relative_indent() {
        let source = "agent writer:\n  prompt: \"\"\"\n    You write notes.\n      - be brief\n    Done.\n  \"\"\"\n  persist: true\nsession: writer \"Go\"\n";
        let program = parse(source).unwrap();
        let writer = program.agent("writer").unwrap();
        assert_eq!(
            writer.prompt.as_deref(),
            Some("You write notes.\n  - be brief\nDone.")
        );
        assert!(writer.persists());
        assert_eq!(
            program.statements[0],
            Stmt::Session(SessionCall::new(Some("writer"), "Go"))
        );
    }

    #[test]
    fn test_prompt_block_with_unicode_whitespace() {
        let source = "agent writer:\n  prompt: \"\"\"\n\u{a0}x\n y\n  \"\"\"\nsession: writer \"Go\"\n";
        let program = parse(source).unwrap();
        assert_eq!(program.agent("writer").unwrap().prompt.as_deref(), Some("\u{a0}x\n y"));
    }

    #[test]
    fn test_resume_and_expressions() {
        let source = "let a = resume: captain \"Continue\"\nlet b = session \"Fresh\"\noutput c = a\nresume: captain \"Again\"\n";
        let program = parse(source).unwrap();
        assert_eq!(
            program.statements[0],
            Stmt::Let {
                name: "a".into(),
                value: Expr::Resume(SessionCall::new(Some("captain"), "Continue")),
            }
        );
        assert_eq!(
            program.statements[2],
            Stmt::Output {
                name: "c".into(),
                value: Expr::Var { name: "a".into() },
            }
        );
        assert_eq!(
            program.statements[3],
            Stmt::Resume(SessionCall::new(Some("captain"), "Again"))
        );
    }

    #[test]
    fn test_errors_are_fatal() {
        for source in [
            "resume \"no agent\"\n",
            "try:\n  session \"x\"\n",
            "catch:\n  session \"x\"\n",
            "session \"unterminated\n",
            "let = \"x\"\n",
            "frobnicate\n",
            "parallel(on-fail: maybe):\n  session \"x\"\n",
            "try:\nsession \"x\"\n",
            "agent a:\n  color: red\n",
            "agent a:\n  model: x\nagent a:\n  model: y\n",
            "agent a:\n  prompt: \"\"\"\n    never closed\n",
        ] {
            let err = parse(source).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ParseFailed, "source: {:?}", source);
        }
    }

    #[test]
    fn test_string_escapes() {
        let program = parse("let s = \"say \\\"hi\\\"\\nbye\"\n").unwrap();
        assert_eq!(
            program.statements[0],
            Stmt::Let {
                name: "s".into(),
                value: Expr::Str { value: "say \"hi\"\nbye".into() },
            }
        );
    }
}
