//! HTTP basic-auth credential store.
//!
//! The credential file holds one `user:hash` entry per line. Crypt hashes in
//! the `$1$` (MD5), `$2a$`/`$2b$`/`$2y$` (bcrypt, `htpasswd -B`), `$5$` and
//! `$6$` (SHA-256/512) formats are verified; entries without a leading `$` are
//! compared as plain text. Apache `$apr1$` and any other scheme are rejected.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::{debug, info, warn};

/// User written to a fresh credential file.
pub const DEFAULT_USER: &str = "admin";

/// Password of [`DEFAULT_USER`] in a fresh credential file.
pub const DEFAULT_PASSWORD: &str = "passw0rd";

/// Crypt schemes checked by [`pwhash::unix::verify`].
const CRYPT_PREFIXES: &[&str] = &["$1$", "$2a$", "$2b$", "$2y$", "$5$", "$6$"];

/// Credential store errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The credential file could not be read or written.
    #[error("Credential file {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Hashing the default password failed.
    #[error("Failed to hash password: {0}")]
    Hash(String),

    /// The file was created but still holds no usable entries.
    #[error("Credential file {} has no entries", .0.display())]
    Empty(PathBuf),
}

/// Users and password hashes for HTTP basic auth.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, String>,
}

impl CredentialStore {
    /// Parse `user:hash` lines. Lines without a colon are skipped.
    pub fn parse(text: &str) -> Self {
        let users = text
            .lines()
            .filter_map(|line| line.trim_end_matches('\r').split_once(':'))
            .map(|(user, hash)| (user.to_string(), hash.to_string()))
            .collect();
        CredentialStore { users }
    }

    /// Load `path`. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(CredentialError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Load `path`, writing a default `admin` entry first if the file is
    /// missing or has no entries.
    pub fn load_or_create(path: &Path) -> Result<Self, CredentialError> {
        let store = Self::load(path)?;
        if !store.is_empty() {
            debug!("Loaded {} user(s) from '{}'", store.len(), path.display());
            return Ok(store);
        }

        info!(
            "Credential file '{}' not found or empty, creating default one",
            path.display()
        );
        write_default(path)?;
        let store = Self::load(path)?;
        if store.is_empty() {
            return Err(CredentialError::Empty(path.to_path_buf()));
        }
        info!(
            "Created '{}' with user {} (SHA-512); change the password before exposing the gateway",
            path.display(),
            DEFAULT_USER
        );
        Ok(store)
    }

    /// Number of users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the store has no users.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check a user's password.
    pub fn verify(&self, user: &str, password: &str) -> bool {
        match self.users.get(user) {
            Some(hash) => verify_password(password, hash),
            None => false,
        }
    }

    /// Check an `Authorization` header value (`Basic <base64 user:password>`).
    pub fn authenticate(&self, header: &str) -> bool {
        let Some(encoded) = header.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            debug!("Auth: malformed base64 credentials");
            return false;
        };
        let decoded = String::from_utf8_lossy(&decoded);
        match decoded.split_once(':') {
            Some((user, password)) => self.verify(user, password),
            None => false,
        }
    }
}

fn verify_password(password: &str, hash: &str) -> bool {
    if CRYPT_PREFIXES.iter().any(|prefix| hash.starts_with(prefix)) {
        pwhash::unix::verify(password, hash)
    } else if hash.starts_with('$') {
        warn!(
            "Auth: unsupported hash scheme '{}', recreate the entry with htpasswd -B",
            hash.split('$').nth(1).unwrap_or_default()
        );
        false
    } else {
        password == hash
    }
}

fn write_default(path: &Path) -> Result<(), CredentialError> {
    let hash = pwhash::sha512_crypt::hash(DEFAULT_PASSWORD)
        .map_err(|e| CredentialError::Hash(e.to_string()))?;
    fs::write(path, format!("{}:{}\n", DEFAULT_USER, hash)).map_err(|source| {
        CredentialError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}
