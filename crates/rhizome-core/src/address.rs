//! Address parsing and normalization
//!
//! rhizome addresses are slash-delimited paths:
//! ```text
//! /bla/bli/blob
//! /synth/1/volume
//! /
//! ```
//!
//! A trailing slash is collapsed (`/bla/` is the same node as `/bla`) and the
//! root `/` has no segments. Addresses starting with `/sys` are reserved for
//! router control messages and cannot be used for ordinary sends.

use crate::sys::SYS_PREFIX;
use crate::{Error, Result};

/// Characters with a special meaning in OSC address patterns
const PATTERN_CHARS: &[char] = &[' ', '#', '*', ',', '?', '[', ']', '{', '}'];

/// A parsed, normalized address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    raw: String,
    segments: Vec<String>,
}

impl Address {
    /// Parse an address string
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty address".to_string()));
        }

        if !s.starts_with('/') {
            return Err(Error::InvalidAddress(format!(
                "address must start with '/': {}",
                s
            )));
        }

        let trimmed = s[1..].strip_suffix('/').unwrap_or(&s[1..]);
        let segments: Vec<String> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').map(|seg| seg.to_string()).collect()
        };

        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(Error::InvalidAddress(format!(
                "empty segment in address: {}",
                s
            )));
        }

        Ok(Self {
            raw: s.to_string(),
            segments,
        })
    }

    /// The address exactly as it was given
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Normalized form, without trailing slash
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Path segments, empty for the root
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, if any
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    /// Check if this address is under the reserved system namespace
    pub fn is_system(&self) -> bool {
        self.segments
            .first()
            .map(|s| format!("/{}", s) == SYS_PREFIX)
            .unwrap_or(false)
    }

    /// Check if `self` is `other` or one of its ancestors
    pub fn is_ancestor_of(&self, other: &Address) -> bool {
        other.segments.starts_with(&self.segments)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl TryFrom<&str> for Address {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Address::parse(&s)
    }
}

/// Validate an address used for an ordinary (user) send.
///
/// The address must parse, must not contain OSC pattern characters, and must
/// not target the system namespace.
pub fn validate_for_send(s: &str) -> Result<Address> {
    let address = Address::parse(s)?;

    if let Some(c) = s.chars().find(|c| PATTERN_CHARS.contains(c)) {
        return Err(Error::InvalidAddress(format!(
            "character '{}' not allowed in {}",
            c, s
        )));
    }

    if address.is_system() {
        return Err(Error::ReservedAddress(s.to_string()));
    }

    Ok(address)
}
