//! Provenance: semantic versions, artifact metadata and content hashes.
//!
//! Hashes are SHA-256 over canonical JSON (object keys sorted recursively,
//! no insignificant whitespace), so the same upstream or prompt always hashes
//! the same regardless of map ordering.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::board::Board;
use crate::prompt::{Prompt, Upstream};

// ---------------------------------------------------------------------------
// SemVer
// ---------------------------------------------------------------------------

/// `major.minor.patch` artifact version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    /// Version of a freshly generated artifact.
    pub const INITIAL: SemVer = SemVer {
        major: 1,
        minor: 0,
        patch: 0,
    };

    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Next minor version, patch reset. Used by revisions.
    pub fn bump_minor(self) -> Self {
        Self {
            major: self.major,
            minor: self.minor + 1,
            patch: 0,
        }
    }
}

impl Default for SemVer {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error returned when parsing an invalid [`SemVer`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid version {0:?}: expected MAJOR.MINOR.PATCH")]
pub struct SemVerParseError(pub String);

impl FromStr for SemVer {
    type Err = SemVerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SemVerParseError(s.to_owned());
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u64, SemVerParseError> {
            parts.next().ok_or_else(err)?.parse().map_err(|_| err())
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(version)
    }
}

impl TryFrom<String> for SemVer {
    type Error = SemVerParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SemVer> for String {
    fn from(v: SemVer) -> Self {
        v.to_string()
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// Everything needed to reproduce or audit a stored board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub artifact_id: Uuid,
    pub project_id: String,
    pub stage_id: String,
    pub stage_name: String,
    pub version: SemVer,
    pub created_at: DateTime<Utc>,
    pub model_id: String,
    pub temperature: f64,
    /// Hash of the prompt that produced the accepted candidate.
    pub prompt_hash: String,
    /// Rule battery version the board was validated with.
    pub validator_version: String,
    pub upstream_hash: String,
    /// Generator calls spent on this version.
    pub attempts: u32,
    /// Version this one was revised from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<SemVer>,
}

/// A validated board plus its provenance. Changed only through revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub metadata: ArtifactMetadata,
    pub board: Board,
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn hash_upstream(upstream: &Upstream) -> String {
    let value = Value::Object(
        upstream
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    sha256_hex(canonical_json(&value).as_bytes())
}

/// Hash of the system and user text. `meta` is not part of the prompt the
/// generator sees and is left out.
pub fn hash_prompt(prompt: &Prompt) -> String {
    let value = serde_json::json!({
        "system": prompt.system,
        "user": prompt.user,
    });
    sha256_hex(canonical_json(&value).as_bytes())
}
