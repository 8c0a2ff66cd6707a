//! Parsing of control-protocol reply lines.
//!
//! A reply is `TOPIC KIND KEY=VALUE KEY="quoted value" ...` on a single line.

use crate::sam::error::ControlError;

/// A parsed reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    topic: String,
    kind: String,
    fields: Vec<(String, String)>,
    raw: String,
}

impl Reply {
    /// Parses one reply line (without the trailing newline).
    pub fn parse(line: &str) -> Result<Self, ControlError> {
        let mut tokens = tokenize(line).into_iter();

        let topic = tokens
            .next()
            .ok_or_else(|| ControlError::Protocol("empty reply".to_string()))?;
        let kind = tokens
            .next()
            .ok_or_else(|| ControlError::Protocol(format!("truncated reply: {}", line)))?;

        let fields = tokens
            .map(|token| match token.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (token, String::new()),
            })
            .collect();

        Ok(Self {
            topic,
            kind,
            fields,
            raw: line.to_string(),
        })
    }

    /// Returns true if the reply starts with `topic kind`.
    pub fn is(&self, topic: &str, kind: &str) -> bool {
        self.topic == topic && self.kind == kind
    }

    /// Value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The `RESULT=` value, if any.
    pub fn result(&self) -> Option<&str> {
        self.get("RESULT")
    }

    /// The reply's `MESSAGE=` text, or the raw line.
    pub fn describe(&self) -> String {
        match (self.result(), self.get("MESSAGE")) {
            (Some(result), Some(message)) => format!("{} ({})", result, message),
            (Some(result), None) => result.to_string(),
            _ => self.raw.clone(),
        }
    }

    /// Checks the leading tag and `RESULT=OK`.
    pub fn expect_ok(self, topic: &str, kind: &str) -> Result<Self, ControlError> {
        if !self.is(topic, kind) {
            return Err(ControlError::Protocol(format!(
                "expected {} {}, got: {}",
                topic, kind, self.raw
            )));
        }
        if self.result() != Some("OK") {
            return Err(ControlError::Protocol(format!(
                "{} {} failed: {}",
                topic,
                kind,
                self.describe()
            )));
        }
        Ok(self)
    }
}

/// Splits on whitespace, keeping double-quoted runs together.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim().chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
