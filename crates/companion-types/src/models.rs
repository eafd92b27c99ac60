use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unrecognised {kind} '{value}'")]
pub struct ParseLabelError {
    kind: &'static str,
    value: String,
}

impl ParseLabelError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// -- Subscriptions --

/// Subscription tier. Stored and sent over the wire as `FREE`, `BASIC`, `PREMIUM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    Free,
    Basic,
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Basic => "BASIC",
            Self::Premium => "PREMIUM",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "BASIC" => Ok(Self::Basic),
            "PREMIUM" => Ok(Self::Premium),
            _ => Err(ParseLabelError::new("plan", s)),
        }
    }
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
        }
    }
}

impl FromStr for Sender {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "ai" => Ok(Self::Ai),
            _ => Err(ParseLabelError::new("sender", s)),
        }
    }
}

// -- Memory extraction --

/// Which trigger rule decides whether a user message becomes a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPolicy {
    /// Contains "my", contains "I", or longer than 50 characters.
    Heuristic,
    /// First hit in a fixed, ordered keyword list (case-insensitive).
    Keywords,
}

impl FromStr for MemoryPolicy {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "keywords" | "keyword" => Ok(Self::Keywords),
            _ => Err(ParseLabelError::new("memory policy", s)),
        }
    }
}

// -- Access control --

/// Status returned when a caller asks for a resource owned by someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DenialStatus {
    /// Indistinguishable from a missing resource.
    #[default]
    NotFound,
    Forbidden,
}

impl FromStr for DenialStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "404" | "not_found" | "not-found" => Ok(Self::NotFound),
            "403" | "forbidden" => Ok(Self::Forbidden),
            _ => Err(ParseLabelError::new("denial status", s)),
        }
    }
}
