//! Project `.env` files.
//!
//! A `.env` file carries the secrets that agent settings reference by
//! `${VAR}` indirection (see `LlmSettings::resolved_api_key`), so keys never
//! sit in the settings TOML itself. Parsing keeps assignment order: repeated
//! keys shadow earlier ones, the way shells treat repeated exports.

use std::path::Path;

/// Parsed `.env` file: ordered `KEY=VALUE` assignments.
#[derive(Debug, Default)]
pub struct EnvFile {
    entries: Vec<(String, String)>,
}

impl EnvFile {
    /// Parses file content. Lines that are not assignments (blank lines,
    /// comments, malformed keys) are ignored.
    pub fn parse(content: &str) -> Self {
        Self {
            entries: content.lines().filter_map(parse_assignment).collect(),
        }
    }

    /// Loads `.env` from `dir` (or the current directory). A missing file is
    /// an empty set of assignments.
    pub fn load(dir: Option<&Path>) -> std::io::Result<Self> {
        let dir = match dir
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
        {
            Some(dir) => dir,
            None => return Ok(Self::default()),
        };
        let path = dir.join(".env");
        if !path.is_file() {
            return Ok(Self::default());
        }
        Ok(Self::parse(&std::fs::read_to_string(&path)?))
    }

    /// The value of a key; with repeated assignments the last one wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Assignments in file order.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One assignment: optional `export` prefix, a key of word characters, and a
/// value with one optional layer of quotes.
fn parse_assignment(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key.to_string(), unquote(value.trim())))
}

/// Strips one layer of matching quotes. Double quotes unescape `\"`; single
/// quotes are literal; anything else passes through.
fn unquote(value: &str) -> String {
    if value.len() >= 2 {
        if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            return inner.replace("\\\"", "\"");
        }
        if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            return inner.to_string();
        }
    }
    value.to_string()
}
