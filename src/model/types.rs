//! Core identity types for vellum.
//!
//! Foundation types used throughout the crate: project identifiers, actor
//! roles, and the acting identity attached to every mutation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ProjectId
// ---------------------------------------------------------------------------

/// A validated project identifier.
///
/// Project ids must be lowercase alphanumeric with hyphens or underscores,
/// 1–64 characters. They double as directory names in the filesystem store,
/// so the charset is deliberately narrow.
/// Examples: `webshop`, `payments-v2`, `team_alpha`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    /// The maximum length of a project id.
    pub const MAX_LEN: usize = 64;

    /// Create a new `ProjectId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains invalid
    /// characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the project id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::ProjectId,
                value: s.to_owned(),
                reason: "project id must not be empty".to_owned(),
            });
        }
        if s.len() > Self::MAX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::ProjectId,
                value: s.to_owned(),
                reason: format!(
                    "project id must be at most {} characters, got {}",
                    Self::MAX_LEN,
                    s.len()
                ),
            });
        }
        if s.starts_with(['-', '_']) || s.ends_with(['-', '_']) {
            return Err(ValidationError {
                kind: ErrorKind::ProjectId,
                value: s.to_owned(),
                reason: "project id must not start or end with a hyphen or underscore".to_owned(),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(ValidationError {
                kind: ErrorKind::ProjectId,
                value: s.to_owned(),
                reason:
                    "project id must contain only lowercase letters (a-z), digits (0-9), hyphens (-), and underscores (_)"
                        .to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProjectId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProjectId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The role an actor carries when calling into the core.
///
/// Roles arrive from the (external) auth layer; the core only consults them
/// for review-gated workflow transitions. Anyone may propose; only reviewers
/// may accept, reject, or approve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-mostly participant; may still propose edits.
    Guest,
    /// Default collaborating role.
    #[default]
    Student,
    /// Reviewer: may accept/reject edits and approve/reject modules.
    Teacher,
    /// Reviewer with operational privileges in the calling layer.
    Admin,
}

impl Role {
    /// Returns `true` if this role may review edits and module transitions.
    #[must_use]
    pub const fn can_review(&self) -> bool {
        matches!(self, Self::Teacher | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::Student => write!(f, "student"),
            Self::Teacher => write!(f, "teacher"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Self::Guest),
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            other => Err(ValidationError {
                kind: ErrorKind::Role,
                value: other.to_owned(),
                reason: "expected one of: guest, student, teacher, admin".to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The authenticated identity performing an operation.
///
/// The core never authenticates anyone; callers hand in whoever their auth
/// layer resolved. The id lands verbatim in audit entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identifier from the auth layer (user id, agent name, ...).
    pub id: String,
    /// Role consulted for review-gated transitions.
    pub role: Role,
}

impl Actor {
    /// Create a new actor.
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Returns `true` if this actor may review.
    #[must_use]
    pub const fn can_review(&self) -> bool {
        self.role.can_review()
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// The kind of value that failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`ProjectId`] validation error.
    ProjectId,
    /// A [`Role`] validation error.
    Role,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProjectId => write!(f, "ProjectId"),
            Self::Role => write!(f, "Role"),
        }
    }
}

/// A validation error for vellum core types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {}: {:?} - {}",
            self.kind, self.value, self.reason
        )
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
