//! Parsing for the class-hierarchy pipeline
//!
//! The analysis pipeline only needs the shape of a module's top-level
//! definitions: class names and the base list of each class. The grammar is
//! correspondingly small:
//!
//! ```text
//! module    := statement*
//! statement := class-def | other-line
//! class-def := "class" NAME [ "(" bases ")" ] ":" [ inline-suite ]
//! bases     := dotted-name ("," dotted-name)*
//! ```
//!
//! A class header without an inline suite must be followed by at least one
//! indented line; indented lines are consumed as suite content but not
//! represented in the tree. `#` starts a comment. All other top-level
//! statements are kept as opaque text so the tree reflects source order.

use std::fmt;

/// Parse failure, with the 1-based line number it was detected at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// 1-based line number
    pub line: usize,
    /// Human-readable description
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// A dotted identifier path such as `a.X`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedName {
    segments: Vec<String>,
}

impl DottedName {
    /// Path segments, in source order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    fn parse(text: &str, line: usize) -> Result<Self, SyntaxError> {
        let segments: Vec<&str> = text.split('.').collect();
        let valid = segments
            .iter()
            .all(|segment| !segment.is_empty() && ident_len(segment) == segment.len());
        if !valid {
            return Err(SyntaxError::new(
                line,
                format!("invalid base expression `{text}`"),
            ));
        }
        Ok(Self {
            segments: segments.into_iter().map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for DottedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// One top-level class definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    /// Declared class name (unqualified)
    pub name: String,
    /// Base expressions in source order, duplicates preserved
    pub bases: Vec<DottedName>,
}

/// A top-level statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Class(ClassDef),
    /// Any non-class statement, kept as raw trimmed text
    Other(String),
}

/// Parse tree of one module: its top-level statements in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleTree {
    pub body: Vec<Stmt>,
}

impl ModuleTree {
    /// First top-level class definition with the given name
    pub fn find_class(&self, name: &str) -> Option<&ClassDef> {
        self.body.iter().find_map(|stmt| match stmt {
            Stmt::Class(def) if def.name == name => Some(def),
            _ => None,
        })
    }
}

/// Strip the leading whitespace common to all non-blank lines
///
/// Editor buffers and test fixtures arrive uniformly indented;
/// normalization happens here rather than at storage so the code layer
/// stays a verbatim record of what was written. Whitespace-only lines are
/// ignored when computing the prefix and normalized to empty lines.
pub fn dedent(source: &str) -> String {
    let mut prefix: Option<&str> = None;
    for line in source.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indent = &line[..line.len() - line.trim_start().len()];
        prefix = Some(match prefix {
            None => indent,
            Some(current) => common_prefix(current, indent),
        });
    }
    let prefix = prefix.unwrap_or("");

    let mut out = String::with_capacity(source.len());
    for (i, line) in source.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if line.trim().is_empty() {
            continue;
        }
        out.push_str(line.strip_prefix(prefix).unwrap_or(line));
    }
    out
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    &a[..len]
}

/// Parse one module into its tree of top-level statements
pub fn parse(source: &str) -> Result<ModuleTree, SyntaxError> {
    let mut body = Vec::new();
    let mut block_open = false;
    let mut suite_pending = false;
    let mut header_line = 0;

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let text = strip_comment(raw);
        if text.trim().is_empty() {
            continue;
        }
        let line = text.trim_end();
        let indent = line.len() - line.trim_start().len();

        if indent > 0 {
            if !block_open {
                return Err(SyntaxError::new(line_no, "unexpected indent"));
            }
            suite_pending = false;
            continue;
        }

        if suite_pending {
            return Err(SyntaxError::new(header_line, "expected an indented block"));
        }

        if line == "class" || line.starts_with("class ") {
            let (def, inline_suite) = parse_class_header(line, line_no)?;
            body.push(Stmt::Class(def));
            block_open = !inline_suite;
            suite_pending = !inline_suite;
            header_line = line_no;
        } else {
            body.push(Stmt::Other(line.to_string()));
            block_open = false;
        }
    }

    if suite_pending {
        return Err(SyntaxError::new(header_line, "expected an indented block"));
    }
    Ok(ModuleTree { body })
}

/// Parse `class NAME [ "(" bases ")" ] ":" [suite]`
///
/// Returns the definition and whether the header carried an inline suite.
fn parse_class_header(line: &str, line_no: usize) -> Result<(ClassDef, bool), SyntaxError> {
    let rest = line["class".len()..].trim_start();
    let name_len = ident_len(rest);
    if name_len == 0 {
        return Err(SyntaxError::new(line_no, "expected a class name after `class`"));
    }
    let name = rest[..name_len].to_string();
    let mut rest = rest[name_len..].trim_start();

    let mut bases = Vec::new();
    if let Some(inner) = rest.strip_prefix('(') {
        let close = inner
            .find(')')
            .ok_or_else(|| SyntaxError::new(line_no, "unclosed `(` in class header"))?;
        let list = &inner[..close];
        if !list.trim().is_empty() {
            for entry in list.split(',') {
                let entry = entry.trim();
                if entry.is_empty() {
                    return Err(SyntaxError::new(line_no, "empty base expression"));
                }
                bases.push(DottedName::parse(entry, line_no)?);
            }
        }
        rest = inner[close + 1..].trim_start();
    }

    let suffix = rest
        .strip_prefix(':')
        .ok_or_else(|| SyntaxError::new(line_no, "expected `:` in class header"))?;
    let inline_suite = !suffix.trim().is_empty();

    Ok((ClassDef { name, bases }, inline_suite))
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Length of the identifier prefix of `text` (0 if none)
fn ident_len(text: &str) -> usize {
    let mut chars = text.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    for (i, c) in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return i;
        }
    }
    text.len()
}
