/*!
 * Fatal Error Reports
 *
 * The typed payload raised when escalation crashes the process, and the
 * sanitising needed before a report leaves the device: engine log tags are
 * dropped, quoted strings, `@` mentions and numbers are masked.
 */

use super::classify::FatalErrorKind;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Unrecoverable condition raised by fatal error escalation
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[error("{}", self.render())]
#[diagnostic(
    code(client::fatal_error),
    help("The engine cannot continue. External causes point at local storage, anything else is a defect.")
)]
pub struct FatalError {
    pub kind: FatalErrorKind,
    pub message: String,
    pub live_clients: u64,
    /// Message has been sanitised and the client count omitted
    pub is_stripped: bool,
    /// Engine source position parsed from the original message
    pub source_location: Option<SourceLocation>,
}

impl FatalError {
    pub fn new(message: impl Into<String>, live_clients: u64) -> Self {
        let message = message.into();
        Self {
            kind: FatalErrorKind::classify(&message),
            source_location: source_location(&message),
            message,
            live_clients,
            is_stripped: false,
        }
    }

    pub fn is_external(&self) -> bool {
        self.kind.is_external()
    }

    fn prefix(&self) -> &'static str {
        if self.is_external() {
            "Fatal error"
        } else {
            "TDLib fatal error"
        }
    }

    fn render(&self) -> String {
        let mut out = String::from(self.prefix());
        if self.live_clients > 0 && !self.is_stripped {
            out.push_str(&format!(" ({})", self.live_clients));
        }
        if !self.message.is_empty() {
            out.push_str(": ");
            out.push_str(&self.message);
        }
        out
    }

    /// Copy of this report safe to send off-device
    pub fn without_private_data(&self) -> Self {
        if self.is_stripped {
            return self.clone();
        }
        Self {
            kind: self.kind,
            message: strip_private_data(&self.message),
            live_clients: self.live_clients,
            is_stripped: true,
            source_location: self.source_location.clone(),
        }
    }
}

/// Engine source position, e.g. `StickersManager.cpp:327`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub component: String,
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Byte offset of the first character after the leading `[...]` log tags
fn skip_log_tags(message: &str) -> usize {
    let mut start = 0;
    let mut in_tag = false;
    for (i, c) in message.char_indices() {
        match c {
            '[' => in_tag = true,
            ']' if in_tag => {
                in_tag = false;
                start = i + 1;
            }
            _ if !in_tag => {
                start = i;
                if !c.is_whitespace() {
                    break;
                }
            }
            _ => {}
        }
    }
    start
}

/// Mask user data in an engine message
pub fn strip_private_data(message: &str) -> String {
    if message.is_empty() {
        return String::new();
    }
    let body = &message[skip_log_tags(message)..];

    let mut masked = String::with_capacity(body.len());
    let mut in_quote = false;
    let mut prev = '\0';
    for c in body.chars() {
        if c == '"' && prev != '\\' {
            if in_quote {
                masked.push_str("STRING");
            }
            in_quote = !in_quote;
        } else if !in_quote {
            match c {
                '@' => masked.push_str("AT"),
                '`' => {}
                _ => masked.push(c),
            }
        }
        prev = c;
    }

    let mut out = String::with_capacity(masked.len());
    let mut in_digits = false;
    for c in masked.chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                out.push('X');
            }
            in_digits = true;
        } else {
            out.push(c);
            in_digits = false;
        }
    }
    out
}

fn is_source_file_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(last) = chars.next_back() else {
        return false;
    };
    let body = chars.as_str();
    !body.is_empty()
        && last != '.'
        && body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Parse the source tag out of an engine log line
///
/// Engine lines look like
/// `[ 0][t 7][1663524892.910522937][StickersManager.cpp:327][#3][!Td]  Check failed`;
/// the fourth tag is the source position.
pub fn source_location(message: &str) -> Option<SourceLocation> {
    let mut tag_count = 0;
    let mut tag_start = None;
    for (i, c) in message.char_indices() {
        match c {
            '[' => tag_start = Some(i),
            ']' => {
                if let Some(start) = tag_start.take() {
                    if tag_count == 3 {
                        return parse_source_tag(&message[start + 1..i]);
                    }
                    tag_count += 1;
                }
            }
            _ if tag_start.is_none() && !c.is_whitespace() => return None,
            _ => {}
        }
    }
    None
}

fn parse_source_tag(tag: &str) -> Option<SourceLocation> {
    let (file, line) = match tag.split_once(':') {
        Some((file, line)) => (file, line.parse().unwrap_or(0)),
        None => (tag, 0),
    };
    if !is_source_file_name(file) {
        return None;
    }
    let component = file.split('.').next().unwrap_or(file);
    Some(SourceLocation {
        file: file.to_string(),
        component: component.to_string(),
        line,
    })
}
