//! Provider credentials and their backing list.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::CredentialError;

/// Identifier used for bare secrets.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Length of a bare provider secret.
const BARE_SECRET_LEN: usize = 32;

/// A provider API key and its health.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Account the key belongs to (usually an email).
    pub identifier: String,
    /// The API key.
    pub secret: String,
    /// Cleared on a quota/auth failure. Never set back by failover.
    pub is_valid: bool,
    /// Quota/auth failures recorded against this key.
    pub error_count: u32,
}

impl Credential {
    /// Fresh, valid credential.
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
            is_valid: true,
            error_count: 0,
        }
    }

    /// Parse one backing-list line: `identifier:secret` or a bare 32-char secret.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some((identifier, secret)) = line.split_once(':') {
            let (identifier, secret) = (identifier.trim(), secret.trim());
            if secret.is_empty() {
                return None;
            }
            let identifier = if identifier.is_empty() {
                UNKNOWN_IDENTIFIER
            } else {
                identifier
            };
            Some(Self::new(identifier, secret))
        } else if line.len() == BARE_SECRET_LEN {
            Some(Self::new(UNKNOWN_IDENTIFIER, line))
        } else {
            None
        }
    }

    /// Secret shortened for logs and notices.
    pub fn masked_secret(&self) -> String {
        mask(&self.secret)
    }

    /// "identifier (abcd1234...)".
    pub fn label(&self) -> String {
        format!("{} ({})", self.identifier, self.masked_secret())
    }

    /// Backing-list line.
    pub fn to_line(&self) -> String {
        format!("{}:{}", self.identifier, self.secret)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.identifier)
            .field("secret", &self.masked_secret())
            .field("is_valid", &self.is_valid)
            .field("error_count", &self.error_count)
            .finish()
    }
}

/// First 8 characters followed by "...".
pub fn mask(secret: &str) -> String {
    let prefix: String = secret.chars().take(8).collect();
    format!("{prefix}...")
}

/// Credential as exposed on status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialSummary {
    /// Account identifier.
    pub identifier: String,
    /// Masked secret.
    pub key: String,
    /// Still usable.
    pub is_valid: bool,
    /// Recorded failures.
    pub error_count: u32,
}

impl From<&Credential> for CredentialSummary {
    fn from(c: &Credential) -> Self {
        Self {
            identifier: c.identifier.clone(),
            key: c.masked_secret(),
            is_valid: c.is_valid,
            error_count: c.error_count,
        }
    }
}

/// Backing list of credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read every credential, in list order.
    async fn load(&self) -> Result<Vec<Credential>, CredentialError>;

    /// Add a credential at the end of the list.
    async fn append(&self, credential: &Credential) -> Result<(), CredentialError>;
}

/// One credential per line in a text file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store backed by `path`. The file may not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Vec<Credential>, CredentialError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Credential file not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let credentials: Vec<Credential> = content.lines().filter_map(Credential::parse_line).collect();
        info!(count = credentials.len(), path = %self.path.display(), "Credentials loaded");
        Ok(credentials)
    }

    async fn append(&self, credential: &Credential) -> Result<(), CredentialError> {
        let needs_newline = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes.last().is_some_and(|b| *b != b'\n'),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut line = String::new();
        if needs_newline {
            line.push('\n');
        }
        line.push_str(&credential.to_line());
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!(credential = %credential.label(), "Credential appended");
        Ok(())
    }
}

/// In-memory store, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    credentials: Arc<Mutex<Vec<Credential>>>,
}

impl MemoryCredentialStore {
    /// Store holding `credentials`.
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: Arc::new(Mutex::new(credentials)),
        }
    }

    /// Store with `count` keys named `user{i}` / `key-{i}`.
    pub fn with_keys(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|i| Credential::new(format!("user{i}"), format!("key-{i}")))
                .collect(),
        )
    }

    /// Add a credential out of band.
    pub fn push(&self, credential: Credential) {
        self.credentials.lock().push(credential);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Vec<Credential>, CredentialError> {
        Ok(self.credentials.lock().clone())
    }

    async fn append(&self, credential: &Credential) -> Result<(), CredentialError> {
        self.credentials.lock().push(credential.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_backing_list_lines() {
        let bare = "0123456789abcdef0123456789abcdef";

        assert_eq!(
            Credential::parse_line("bob@mail.tm:abc123"),
            Some(Credential::new("bob@mail.tm", "abc123"))
        );
        assert_eq!(
            Credential::parse_line(bare),
            Some(Credential::new(UNKNOWN_IDENTIFIER, bare))
        );
        assert_eq!(Credential::parse_line("too-short"), None);
        assert_eq!(Credential::parse_line("bob@mail.tm:"), None);
        assert_eq!(Credential::parse_line("   "), None);
    }

    #[test]
    fn debug_output_masks_secret() {
        let credential = Credential::new("bob", "0123456789abcdef");
        let debug = format!("{credential:?}");

        assert!(debug.contains("01234567..."));
        assert!(!debug.contains("0123456789abcdef"));
        assert_eq!(credential.label(), "bob (01234567...)");
    }

    #[tokio::test]
    async fn file_store_loads_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.txt");
        tokio::fs::write(&path, "a@x.io:key-a\nnot a key\nb@x.io:key-b")
            .await
            .unwrap();
        let store = FileCredentialStore::new(&path);

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);

        store.append(&Credential::new("c@x.io", "key-c")).await.unwrap();
        let reloaded = store.load().await.unwrap();

        let secrets: Vec<_> = reloaded.iter().map(|c| c.secret.as_str()).collect();
        assert_eq!(secrets, vec!["key-a", "key-b", "key-c"]);
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("absent.txt"));

        assert!(store.load().await.unwrap().is_empty());

        store.append(&Credential::new("a", "key-a")).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 1);
    }
}
