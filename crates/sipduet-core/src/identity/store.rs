//! Persistence for identity tokens
//!
//! Tokens are kept as cookie-style records, one per line:
//!
//! ```text
//! onsipToken=Xk2...9a;expires=Mon, 19 Oct 2026 08:15:00 GMT;
//! ```
//!
//! Two stores are provided: [`MemoryTokenStore`] for tests and short-lived
//! processes, and [`FileTokenStore`] which behaves like a small cookie jar on
//! disk.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::token::IdentityToken;
use crate::error::{DuetError, DuetResult};

const EXPIRES_ATTR: &str = "expires";
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Keyed storage for identity tokens
pub trait TokenStore: Send + Sync {
    /// Load the token stored under `key`, if any
    fn load(&self, key: &str) -> DuetResult<Option<IdentityToken>>;

    /// Store `token` under `key`, replacing any previous record
    fn save(&self, key: &str, token: &IdentityToken) -> DuetResult<()>;
}

impl<S: TokenStore + ?Sized> TokenStore for std::sync::Arc<S> {
    fn load(&self, key: &str) -> DuetResult<Option<IdentityToken>> {
        (**self).load(key)
    }

    fn save(&self, key: &str, token: &IdentityToken) -> DuetResult<()> {
        (**self).save(key, token)
    }
}

/// Format a token as a cookie record
///
/// ```rust
/// use sipduet_core::identity::{format_record, IdentityToken};
/// use chrono::{TimeZone, Utc};
///
/// let expires = Utc.with_ymd_and_hms(2026, 10, 19, 8, 15, 0).unwrap();
/// let record = format_record("onsipToken", &IdentityToken::new("abc", expires));
/// assert_eq!(record, "onsipToken=abc;expires=Mon, 19 Oct 2026 08:15:00 GMT;");
/// ```
pub fn format_record(key: &str, token: &IdentityToken) -> String {
    format!(
        "{}={};{}={};",
        key,
        token.value(),
        EXPIRES_ATTR,
        token.expires_at().format(HTTP_DATE_FORMAT)
    )
}

/// Parse a cookie record, returning the token if the record belongs to `key`.
///
/// Records for other keys and records with an empty value yield `Ok(None)`.
/// A record for `key` without a readable `expires` attribute is malformed.
pub fn parse_record(record: &str, key: &str) -> DuetResult<Option<IdentityToken>> {
    let mut parts = record.split(';').map(str::trim).filter(|p| !p.is_empty());

    let Some((name, value)) = parts.next().and_then(|p| p.split_once('=')) else {
        return Ok(None);
    };
    if name.trim() != key {
        return Ok(None);
    }
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    let expires = parts
        .filter_map(|p| p.split_once('='))
        .find(|(attr, _)| attr.trim().eq_ignore_ascii_case(EXPIRES_ATTR))
        .map(|(_, date)| date.trim())
        .ok_or_else(|| DuetError::MalformedRecord {
            record: record.to_string(),
        })?;

    let expires_at = DateTime::parse_from_rfc2822(expires)
        .map_err(|_| DuetError::MalformedRecord {
            record: record.to_string(),
        })?
        .with_timezone(&Utc);

    Ok(Some(IdentityToken::new(value, expires_at)))
}

/// In-memory token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: DashMap<String, String>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw record stored under `key`
    pub fn record(&self, key: &str) -> Option<String> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// Put a raw record in place, as if written by someone else
    pub fn insert_record(&self, key: impl Into<String>, record: impl Into<String>) {
        self.records.insert(key.into(), record.into());
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, key: &str) -> DuetResult<Option<IdentityToken>> {
        match self.records.get(key) {
            Some(record) => parse_record(record.value(), key),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, token: &IdentityToken) -> DuetResult<()> {
        self.records
            .insert(key.to_string(), format_record(key, token));
        Ok(())
    }
}

/// Cookie-jar style store backed by a text file
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> DuetResult<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(DuetError::token_store(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

fn record_key(line: &str) -> Option<&str> {
    line.split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(name, _)| name.trim())
}

impl TokenStore for FileTokenStore {
    fn load(&self, key: &str) -> DuetResult<Option<IdentityToken>> {
        for line in self.read_lines()? {
            if record_key(&line) == Some(key) {
                return parse_record(&line, key);
            }
        }
        Ok(None)
    }

    fn save(&self, key: &str, token: &IdentityToken) -> DuetResult<()> {
        let mut lines: Vec<String> = self
            .read_lines()?
            .into_iter()
            .filter(|line| record_key(line) != Some(key))
            .collect();
        lines.push(format_record(key, token));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut contents = lines.join("\n");
        contents.push('\n');
        std::fs::write(&self.path, contents).map_err(|e| {
            DuetError::token_store(format!("cannot write {}: {}", self.path.display(), e))
        })?;

        debug!("Stored {} record in {}", key, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 15, 0).unwrap()
    }

    #[test]
    fn test_parse_formatted_record() {
        let token = IdentityToken::new("Ab3", expiry());
        let record = format_record("onsipToken", &token);
        assert_eq!(parse_record(&record, "onsipToken").unwrap(), Some(token));
    }

    #[test]
    fn test_parse_other_key_is_none() {
        let record = "otherKey=abc;expires=Mon, 19 Oct 2026 08:15:00 GMT;";
        assert_eq!(parse_record(record, "onsipToken").unwrap(), None);
    }

    #[test]
    fn test_parse_empty_value_is_none() {
        let record = "onsipToken=;expires=Mon, 19 Oct 2026 08:15:00 GMT;";
        assert_eq!(parse_record(record, "onsipToken").unwrap(), None);
        assert_eq!(parse_record("", "onsipToken").unwrap(), None);
    }

    #[test]
    fn test_parse_missing_expiry_is_malformed() {
        let err = parse_record("onsipToken=abc;", "onsipToken").unwrap_err();
        assert!(matches!(err, DuetError::MalformedRecord { .. }));

        let err = parse_record("onsipToken=abc;expires=tomorrow;", "onsipToken").unwrap_err();
        assert!(matches!(err, DuetError::MalformedRecord { .. }));
    }

    #[test]
    fn test_memory_store_roundtrip_uses_record_format() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load("onsipToken").unwrap(), None);

        let token = IdentityToken::new("abc", expiry());
        store.save("onsipToken", &token).unwrap();
        assert_eq!(
            store.record("onsipToken").as_deref(),
            Some("onsipToken=abc;expires=Mon, 19 Oct 2026 08:15:00 GMT;")
        );
        assert_eq!(store.load("onsipToken").unwrap(), Some(token));
    }

    #[test]
    fn test_file_store_keeps_unrelated_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("jar").join("cookies.txt"));
        assert_eq!(store.load("onsipToken").unwrap(), None);

        let other = IdentityToken::new("zzz", expiry());
        store.save("other", &other).unwrap();

        let first = IdentityToken::new("first", expiry());
        store.save("onsipToken", &first).unwrap();
        let second = IdentityToken::new("second", expiry());
        store.save("onsipToken", &second).unwrap();

        assert_eq!(store.load("onsipToken").unwrap(), Some(second));
        assert_eq!(store.load("other").unwrap(), Some(other));

        let contents = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
