//! Session codes (relay) and pairing codes (direct-connect).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Characters used for session codes. `0`/`O` and `1`/`I` are left out so a
/// code read off a screen cannot be mistyped.
pub const SESSION_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of both session codes and pairing codes.
pub const CODE_LEN: usize = 6;

/// A 6-character relay session address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Normalise user input: trim, upper-case, drop anything that is not
    /// ASCII alphanumeric, keep at most [`CODE_LEN`] characters.
    pub fn normalize(raw: &str) -> String {
        raw.trim()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .take(CODE_LEN)
            .collect()
    }

    /// Parse and normalise a code typed or scanned by a member.
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let normalized = Self::normalize(raw);
        if normalized.len() == CODE_LEN {
            Ok(Self(normalized))
        } else {
            Err(TypesError::InvalidSessionCode(raw.to_string()))
        }
    }

    /// Build a fresh code from [`SESSION_CODE_ALPHABET`].
    ///
    /// `pick(n)` must return a value in `0..n`.
    pub fn generate(mut pick: impl FnMut(usize) -> usize) -> Self {
        let code = (0..CODE_LEN)
            .map(|_| {
                let idx = pick(SESSION_CODE_ALPHABET.len()) % SESSION_CODE_ALPHABET.len();
                char::from(SESSION_CODE_ALPHABET[idx])
            })
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionCode {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}

impl FromStr for SessionCode {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for SessionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 6-digit numeric code shown by a direct-connect host.
///
/// Only one pairing code is live per host process, so no uniqueness check
/// is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PairingCode(String);

impl PairingCode {
    /// Build a fresh code. `pick(n)` must return a value in `0..n`.
    pub fn generate(mut pick: impl FnMut(u32) -> u32) -> Self {
        Self(format!("{:06}", pick(1_000_000) % 1_000_000))
    }

    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let trimmed = raw.trim();
        if trimmed.len() == CODE_LEN && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(TypesError::InvalidPairingCode(raw.to_string()))
        }
    }

    /// Exact comparison against the code a client sent.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PairingCode {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PairingCode> for String {
    fn from(code: PairingCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for PairingCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
