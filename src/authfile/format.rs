//! The proxy's credential file format.
//!
//! One entry per line: `"username" "hash"`. Inside a quoted field `""` is a
//! literal quote. `#` starts a comment line and blank lines are ignored.
//! Anything after the second field is ignored, as the proxy does.

use std::collections::BTreeMap;

/// First lines of every file this crate writes.
pub const AUTH_FILE_HEADER: &str = "\
# pgbouncer auth file, synchronized from pg_authid by pgbsync.
# Entries for roles in the catalog are rewritten on every change.
";

/// Username to hash map of an auth file. Ordered so rendering is stable.
pub type AuthMap = BTreeMap<String, String>;

/// One `"username" "hash"` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFileEntry {
    pub username: String,
    pub hash: String,
}

impl AuthFileEntry {
    pub fn new(username: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            hash: hash.into(),
        }
    }
}

/// Why a non-comment line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    #[error("expected a quoted field at column {0}")]
    ExpectedQuote(usize),
    #[error("unterminated quoted field starting at column {0}")]
    Unterminated(usize),
    #[error("missing separator between fields")]
    MissingSeparator,
}

/// Result of parsing a whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAuthFile {
    pub entries: AuthMap,
    /// 1-based line numbers and causes of lines that were skipped.
    pub malformed: Vec<(usize, LineError)>,
}

/// Parse one quoted field starting at byte `start` of `line`.
///
/// Returns the unescaped value and the byte offset just past the closing
/// quote.
fn parse_quoted(line: &str, start: usize) -> Result<(String, usize), LineError> {
    let rest = &line[start..];
    if !rest.starts_with('"') {
        return Err(LineError::ExpectedQuote(start + 1));
    }

    let mut value = String::new();
    let mut chars = rest.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        if c == '"' {
            if matches!(chars.peek(), Some((_, '"'))) {
                value.push('"');
                chars.next();
            } else {
                return Ok((value, start + i + 1));
            }
        } else {
            value.push(c);
        }
    }
    Err(LineError::Unterminated(start + 1))
}

/// Parse a single line.
///
/// `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<AuthFileEntry>, LineError> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let offset = line.len() - trimmed.len();

    let (username, after_user) = parse_quoted(line, offset)?;
    let rest = &line[after_user..];
    let gap = rest.len() - rest.trim_start().len();
    if gap == 0 {
        return Err(LineError::MissingSeparator);
    }
    let (hash, _) = parse_quoted(line, after_user + gap)?;

    Ok(Some(AuthFileEntry { username, hash }))
}

/// Parse a whole file. A later line for the same username wins.
pub fn parse_auth_file(contents: &str) -> ParsedAuthFile {
    let mut parsed = ParsedAuthFile::default();
    for (index, line) in contents.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(entry)) => {
                parsed.entries.insert(entry.username, entry.hash);
            }
            Ok(None) => {}
            Err(e) => parsed.malformed.push((index + 1, e)),
        }
    }
    parsed
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Render one entry line, without the trailing newline.
pub fn render_entry(username: &str, hash: &str) -> String {
    format!("{} {}", quote(username), quote(hash))
}

/// Render a full file: header, then entries sorted by username.
pub fn render_auth_file(entries: &AuthMap) -> String {
    let mut out = String::from(AUTH_FILE_HEADER);
    for (username, hash) in entries {
        out.push_str(&render_entry(username, hash));
        out.push('\n');
    }
    out
}
