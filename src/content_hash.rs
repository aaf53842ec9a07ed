// Content addressing using Blake3 hashing
//
// Every identifier the index derives from content goes through this module:
// reference ids (short URL-safe tokens), cache keys (hex digests of the
// requested package set) and recursive hashes of local package directories.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use walkdir::WalkDir;

/// Number of digest bytes kept when encoding a short token.
///
/// 16 bytes encode to 22 URL-safe characters.
pub const TOKEN_BYTES: usize = 16;

/// Directory names skipped while hashing a local package source tree.
pub const TRANSIENT_DIRS: &[&str] = &["node_modules", ".git", "target", "dist", "build", ".fcm"];

/// Content hash computed using Blake3
///
/// A 32-byte digest that identifies content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute hash from a byte slice
    ///
    /// # Example
    /// ```
    /// use octofhir_canonical_index::content_hash::ContentHash;
    ///
    /// let hash = ContentHash::from_bytes(b"Hello, FHIR!");
    /// assert_eq!(hash.to_hex().len(), 64);
    /// ```
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self(*hash.as_bytes())
    }

    /// Convert hash to a 64 character lowercase hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse hash from hexadecimal string
    ///
    /// # Errors
    /// Returns error if string is not exactly 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, ContentHashError> {
        if s.len() != 64 {
            return Err(ContentHashError::InvalidLength {
                expected: 64,
                actual: s.len(),
            });
        }

        let bytes = hex::decode(s).map_err(|e| ContentHashError::InvalidHex {
            input: s.to_string(),
            source: e,
        })?;

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes);
        Ok(Self(hash))
    }

    /// Short URL-safe token made from the first [`TOKEN_BYTES`] of the digest.
    ///
    /// # Example
    /// ```
    /// use octofhir_canonical_index::content_hash::ContentHash;
    ///
    /// let token = ContentHash::from_bytes(b"pkg@1.0.0:/a.json").to_token();
    /// assert_eq!(token.len(), 22);
    /// assert!(!token.contains('/') && !token.contains('+'));
    /// ```
    pub fn to_token(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0[..TOKEN_BYTES])
    }

    /// Get the raw 32 bytes of the hash
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = ContentHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Errors when parsing content hashes
#[derive(Debug, thiserror::Error)]
pub enum ContentHashError {
    #[error("Invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid hex string '{input}': {source}")]
    InvalidHex {
        input: String,
        #[source]
        source: hex::FromHexError,
    },
}

/// Recursive content hash of a directory tree.
///
/// Files are visited in sorted order and both the relative path and the file
/// bytes feed the hasher, so renames and edits both change the result.
/// Directories named in [`TRANSIENT_DIRS`] are skipped entirely.
pub fn hash_directory(root: &Path) -> io::Result<ContentHash> {
    let mut hasher = blake3::Hasher::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() > 0
                && e.file_type().is_dir()
                && e.file_name()
                    .to_str()
                    .is_some_and(|name| TRANSIENT_DIRS.contains(&name)))
        });

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update(&[0]);
        hasher.update(&std::fs::read(entry.path())?);
        hasher.update(&[0]);
    }

    Ok(ContentHash(*hasher.finalize().as_bytes()))
}
