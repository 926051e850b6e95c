//! Client-side user accounts
//!
//! Accounts live in a flat file with one `username,password,language` line
//! each. Passwords are stored as given.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{RelayError, Result};

pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MAX_PASSWORD_LENGTH: usize = 50;
pub const MAX_LANGUAGE_LENGTH: usize = 10;

/// Logged-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub username: String,
    pub language: String,
}

impl UserProfile {
    pub fn new(username: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            language: language.into(),
        }
    }

    /// `"<user> (<language>)"`, the prefix of every chat line this user sends
    pub fn chat_prefix(&self) -> String {
        format!("{} ({})", self.username, self.language)
    }
}

/// Credential check
pub trait Authenticator {
    /// `Ok(None)` means unknown user or wrong password
    fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserProfile>>;
}

#[derive(Debug, Clone)]
struct UserRecord {
    username: String,
    password: String,
    language: String,
}

impl UserRecord {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(3, ',');
        let username = fields.next()?.trim();
        let password = fields.next()?.trim();
        let language = fields.next().unwrap_or_default().trim();
        if username.is_empty() {
            return None;
        }
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
            language: language.to_string(),
        })
    }
}

/// [`Authenticator`] backed by a users file
#[derive(Debug, Clone)]
pub struct FileUserStore {
    path: PathBuf,
}

impl FileUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add an account. Fails if the username is taken or a field is invalid.
    pub fn register(&self, username: &str, password: &str, language: &str) -> Result<UserProfile> {
        validate_field("username", username, MAX_USERNAME_LENGTH)?;
        validate_field("password", password, MAX_PASSWORD_LENGTH)?;
        validate_field("language", language, MAX_LANGUAGE_LENGTH)?;

        if self.records()?.iter().any(|record| record.username == username) {
            return Err(RelayError::auth(format!("username '{}' is already taken", username)));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                RelayError::auth(format!("failed to open {}: {}", self.path.display(), e))
            })?;
        writeln!(file, "{},{},{}", username, password, language)?;

        info!("Registered user {}", username);
        Ok(UserProfile::new(username, language))
    }

    /// All stored accounts. A missing file has none.
    fn records(&self) -> Result<Vec<UserRecord>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("users file {} does not exist yet", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(RelayError::auth(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        Ok(contents.lines().filter_map(UserRecord::parse).collect())
    }
}

impl Authenticator for FileUserStore {
    fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserProfile>> {
        let profile = self
            .records()?
            .into_iter()
            .find(|record| record.username == username && record.password == password)
            .map(|record| UserProfile::new(record.username, record.language));
        Ok(profile)
    }
}

fn validate_field(name: &str, value: &str, max_len: usize) -> Result<()> {
    if value.is_empty() {
        return Err(RelayError::auth(format!("{} must not be empty", name)));
    }
    if value.len() > max_len {
        return Err(RelayError::auth(format!(
            "{} is longer than {} bytes",
            name, max_len
        )));
    }
    if value.contains(&[',', '\n', '\r'][..]) {
        return Err(RelayError::auth(format!(
            "{} must not contain commas or line breaks",
            name
        )));
    }
    Ok(())
}
