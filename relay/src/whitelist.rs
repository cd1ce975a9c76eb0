//! The static username/password whitelist gating relay access.
//!
//! The whitelist is a UTF-8 text file in CSV format, one
//! `username,password` pair per line. Blank lines and lines starting with
//! `#` are ignored. It is loaded once at server startup and immutable for
//! the server's lifetime; a missing or unreadable file is fatal.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{RelayError, RelayResult};

/// One permitted login. Equality is exact string match; fields are trimmed
/// at load time and candidates are trimmed at check time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedUser {
    pub username: String,
    pub password: String,
}

/// The set of users permitted to open a relay session.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    users: Vec<AllowedUser>,
}

impl Whitelist {
    /// Load the whitelist from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Whitelist`] if the file cannot be read; the
    /// server treats this as fatal at startup.
    pub fn load(path: &Path) -> RelayResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| RelayError::Whitelist {
            path: path.to_path_buf(),
            source,
        })?;

        let list = Self::parse(&text);
        debug!(users = list.len(), path = %path.display(), "whitelist loaded");
        Ok(list)
    }

    /// Parse whitelist text: `username,password` per line, blank and `#`
    /// lines skipped. Lines without a comma carry no password and are
    /// skipped as well.
    pub fn parse(text: &str) -> Self {
        let mut users = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((username, password)) = line.split_once(',') {
                users.push(AllowedUser {
                    username: username.trim().to_string(),
                    password: password.trim().to_string(),
                });
            }
        }

        Whitelist { users }
    }

    /// Check a candidate login against the whitelist, trimming both fields.
    pub fn contains(&self, username: &str, password: &str) -> bool {
        let username = username.trim();
        let password = password.trim();
        self.users
            .iter()
            .any(|u| u.username == username && u.password == password)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        let list = Whitelist::parse("# operators\njoe,password23\n\nkate,hunter2\n");
        assert_eq!(list.len(), 2);
        assert!(list.contains("joe", "password23"));
        assert!(list.contains("kate", "hunter2"));
    }

    #[test]
    fn test_contains_trims_candidate() {
        let list = Whitelist::parse("joe , password23\n");
        assert!(list.contains(" joe ", "password23\n"));
        assert!(!list.contains("joe", "wrong"));
        assert!(!list.contains("someone", "password23"));
    }

    #[test]
    fn test_line_without_comma_is_skipped() {
        let list = Whitelist::parse("just-a-username\n");
        assert!(list.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let err = Whitelist::load(Path::new("/nonexistent/whitelist.txt")).unwrap_err();
        assert!(matches!(err, RelayError::Whitelist { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.txt");
        std::fs::write(&path, "joe,password23\n").unwrap();

        let list = Whitelist::load(&path).unwrap();
        assert!(list.contains("joe", "password23"));
    }
}
