//! Body and header formatting for traffic lines.
//!
//! # Responsibilities
//! - Turn captured body bytes into log text (as-is, JSON, XML)
//! - Turn header maps into log text (all, selected, redacted)
//! - Contain formatter failures: errors and panics become a placeholder
//!
//! # Design Decisions
//! - Formatters only ever see a copy of the bytes
//! - Long string literals can be cut so large payloads stay readable

use std::panic::{catch_unwind, AssertUnwindSafe};

use axum::http::{HeaderMap, HeaderName};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use thiserror::Error;

/// Marker written instead of a segment that could not be formatted.
pub const UNAVAILABLE: &str = "unavailable";

const CUT_MARKER: &str = "...";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("formatter panicked")]
    Panicked,
}

/// `bytes -> text` formatting of a body copy.
pub trait BodyFormatter: Send + Sync {
    fn format(&self, body: &[u8]) -> Result<String, FormatError>;
}

/// `headers -> text` formatting.
pub trait HeaderFormatter: Send + Sync {
    fn format(&self, headers: &HeaderMap) -> Result<String, FormatError>;
}

/// Format a body, degrading any failure to `<unavailable: reason>`.
pub fn render_body(formatter: &dyn BodyFormatter, body: &[u8]) -> String {
    guarded(|| formatter.format(body))
}

/// Format headers, degrading any failure to `<unavailable: reason>`.
pub fn render_headers(formatter: &dyn HeaderFormatter, headers: &HeaderMap) -> String {
    guarded(|| formatter.format(headers))
}

fn guarded(format: impl FnOnce() -> Result<String, FormatError>) -> String {
    let result = catch_unwind(AssertUnwindSafe(format)).unwrap_or(Err(FormatError::Panicked));
    match result {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(error = %err, "Traffic segment formatting failed");
            format!("<{}: {}>", UNAVAILABLE, err)
        }
    }
}

/// Body text as received, decoded lossily as UTF-8.
#[derive(Debug, Clone, Default)]
pub struct AsIsFormat {
    newline_replacer: Option<String>,
    cut_to: usize,
}

impl AsIsFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace newlines with a single space.
    pub fn one_line(self) -> Self {
        self.newline_replacer(" ")
    }

    pub fn newline_replacer(mut self, value: impl Into<String>) -> Self {
        self.newline_replacer = Some(value.into());
        self
    }

    /// Keep at most `chars` characters; `0` keeps everything.
    pub fn cut_to(mut self, chars: usize) -> Self {
        self.cut_to = chars;
        self
    }
}

impl BodyFormatter for AsIsFormat {
    fn format(&self, body: &[u8]) -> Result<String, FormatError> {
        let text = String::from_utf8_lossy(body);
        let text = cut(&text, self.cut_to);
        Ok(match &self.newline_replacer {
            Some(replacer) => text.replace('\n', replacer),
            None => text,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Layout {
    #[default]
    AsIs,
    OneLine,
    Indented(String),
}

/// JSON bodies, optionally re-laid out.
///
/// Layout changes require valid JSON; as-is output never fails.
#[derive(Debug, Clone, Default)]
pub struct JsonFormat {
    layout: Layout,
    cut_string_literals: usize,
}

impl JsonFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn one_line(mut self) -> Self {
        self.layout = Layout::OneLine;
        self
    }

    pub fn indent(mut self, indent: impl Into<String>) -> Self {
        self.layout = Layout::Indented(indent.into());
        self
    }

    /// Cut string values longer than `chars`. Implies re-layout.
    pub fn cut_string_literals(mut self, chars: usize) -> Self {
        self.cut_string_literals = chars;
        if chars > 0 && self.layout == Layout::AsIs {
            self.layout = Layout::OneLine;
        }
        self
    }
}

impl BodyFormatter for JsonFormat {
    fn format(&self, body: &[u8]) -> Result<String, FormatError> {
        if self.layout == Layout::AsIs {
            return Ok(String::from_utf8_lossy(body).into_owned());
        }

        let mut value: Value = serde_json::from_slice(body)?;
        if self.cut_string_literals > 0 {
            cut_strings(&mut value, self.cut_string_literals);
        }

        match &self.layout {
            Layout::Indented(indent) => {
                let mut out = Vec::new();
                let formatter = PrettyFormatter::with_indent(indent.as_bytes());
                let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
                value.serialize(&mut serializer)?;
                Ok(String::from_utf8_lossy(&out).into_owned())
            }
            _ => Ok(serde_json::to_string(&value)?),
        }
    }
}

fn cut_strings(value: &mut Value, limit: usize) {
    match value {
        Value::String(text) => {
            if text.chars().count() > limit {
                *text = cut(text, limit);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| cut_strings(item, limit)),
        Value::Object(map) => map.values_mut().for_each(|item| cut_strings(item, limit)),
        _ => {}
    }
}

fn cut(text: &str, limit: usize) -> String {
    if limit == 0 {
        return text.to_string();
    }
    match text.char_indices().nth(limit) {
        Some((end, _)) => format!("{}{}", &text[..end], CUT_MARKER),
        None => text.to_string(),
    }
}

/// XML bodies, optionally re-indented or folded onto one line.
#[derive(Debug, Clone, Default)]
pub struct XmlFormat {
    layout: Layout,
    cut_string_literals: usize,
}

impl XmlFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn one_line(mut self) -> Self {
        self.layout = Layout::OneLine;
        self
    }

    pub fn indent(mut self, indent: impl Into<String>) -> Self {
        self.layout = Layout::Indented(indent.into());
        self
    }

    /// Cut text nodes longer than `chars`. Implies re-layout.
    pub fn cut_string_literals(mut self, chars: usize) -> Self {
        self.cut_string_literals = chars;
        if chars > 0 && self.layout == Layout::AsIs {
            self.layout = Layout::Indented("  ".to_string());
        }
        self
    }
}

impl BodyFormatter for XmlFormat {
    fn format(&self, body: &[u8]) -> Result<String, FormatError> {
        let text = String::from_utf8_lossy(body);
        let (indent, separator) = match &self.layout {
            Layout::AsIs => return Ok(text.into_owned()),
            Layout::OneLine => ("", ""),
            Layout::Indented(indent) => (indent.as_str(), "\n"),
        };

        let tokens = tokenize_xml(&text)?;
        let mut lines: Vec<String> = Vec::new();
        let mut open: Vec<&str> = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            let pad = indent.repeat(open.len());
            match &tokens[i] {
                XmlToken::Open { name, raw } => {
                    // <a>text</a> stays on one line
                    if let (Some(XmlToken::Text(text)), Some(XmlToken::Close { name: closing, raw: close_raw })) =
                        (tokens.get(i + 1), tokens.get(i + 2))
                    {
                        if closing == name {
                            let text = cut(text.trim(), self.cut_string_literals);
                            lines.push(format!("{}{}{}{}", pad, raw, text, close_raw));
                            i += 3;
                            continue;
                        }
                    }
                    lines.push(format!("{}{}", pad, raw));
                    open.push(name);
                }
                XmlToken::Close { name, raw } => {
                    match open.pop() {
                        Some(expected) if expected == *name => {}
                        Some(expected) => {
                            return Err(FormatError::Xml(format!(
                                "expected </{}>, found </{}>",
                                expected, name
                            )))
                        }
                        None => return Err(FormatError::Xml(format!("unexpected </{}>", name))),
                    }
                    lines.push(format!("{}{}", indent.repeat(open.len()), raw));
                }
                XmlToken::Leaf(raw) => lines.push(format!("{}{}", pad, raw)),
                XmlToken::Text(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        lines.push(format!("{}{}", pad, cut(text, self.cut_string_literals)));
                    }
                }
            }
            i += 1;
        }

        if let Some(unclosed) = open.pop() {
            return Err(FormatError::Xml(format!("unclosed <{}>", unclosed)));
        }
        Ok(lines.join(separator))
    }
}

#[derive(Debug, PartialEq)]
enum XmlToken<'a> {
    Open { name: &'a str, raw: &'a str },
    Close { name: &'a str, raw: &'a str },
    /// Self-closing element, declaration, comment, CDATA or doctype.
    Leaf(&'a str),
    Text(&'a str),
}

fn tokenize_xml(text: &str) -> Result<Vec<XmlToken<'_>>, FormatError> {
    let mut tokens = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let Some(start) = rest.find('<') else {
            tokens.push(XmlToken::Text(rest));
            break;
        };
        if start > 0 {
            tokens.push(XmlToken::Text(&rest[..start]));
            rest = &rest[start..];
        }

        let terminator = if rest.starts_with("<!--") {
            Some("-->")
        } else if rest.starts_with("<![CDATA[") {
            Some("]]>")
        } else if rest.starts_with("<?") {
            Some("?>")
        } else {
            None
        };

        let end = match terminator {
            Some(terminator) => rest
                .find(terminator)
                .map(|at| at + terminator.len())
                .ok_or_else(|| FormatError::Xml(format!("missing {}", terminator)))?,
            None => tag_end(rest).ok_or_else(|| FormatError::Xml("unterminated tag".to_string()))?,
        };

        let raw = &rest[..end];
        let token = if terminator.is_some() || raw.starts_with("<!") || raw.ends_with("/>") {
            XmlToken::Leaf(raw)
        } else if let Some(inner) = raw.strip_prefix("</") {
            XmlToken::Close {
                name: inner.trim_end_matches('>').trim(),
                raw,
            }
        } else {
            XmlToken::Open {
                name: element_name(raw),
                raw,
            }
        };
        tokens.push(token);
        rest = &rest[end..];
    }

    Ok(tokens)
}

/// Index just past the `>` closing the tag at the start of `text`, skipping quoted values.
fn tag_end(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (at, c) in text.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(at + 1),
            (None, '<') => return None,
            _ => {}
        }
    }
    None
}

fn element_name(raw: &str) -> &str {
    let inner = raw.trim_start_matches('<').trim_end_matches('>');
    inner
        .split(|c: char| c.is_whitespace())
        .next()
        .unwrap_or(inner)
}

/// All headers as `name: value` pairs, one pair per value.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllHeaders;

impl HeaderFormatter for AllHeaders {
    fn format(&self, headers: &HeaderMap) -> Result<String, FormatError> {
        Ok(join_headers(headers, |_| true, |_| false))
    }
}

/// Selected headers, with some values masked.
#[derive(Debug, Clone, Default)]
pub struct SelectedHeaders {
    only: Option<Vec<HeaderName>>,
    redact: Vec<HeaderName>,
}

impl SelectedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log only these headers.
    pub fn only(mut self, names: impl IntoIterator<Item = HeaderName>) -> Self {
        self.only = Some(names.into_iter().collect());
        self
    }

    /// Mask the values of these headers.
    pub fn redact(mut self, names: impl IntoIterator<Item = HeaderName>) -> Self {
        self.redact.extend(names);
        self
    }
}

impl HeaderFormatter for SelectedHeaders {
    fn format(&self, headers: &HeaderMap) -> Result<String, FormatError> {
        Ok(join_headers(
            headers,
            |name| self.only.as_ref().map_or(true, |only| only.contains(name)),
            |name| self.redact.contains(name),
        ))
    }
}

fn join_headers(
    headers: &HeaderMap,
    include: impl Fn(&HeaderName) -> bool,
    mask: impl Fn(&HeaderName) -> bool,
) -> String {
    headers
        .iter()
        .filter(|(name, _)| include(name))
        .map(|(name, value)| {
            if mask(name) {
                format!("{}: ***", name)
            } else {
                format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
