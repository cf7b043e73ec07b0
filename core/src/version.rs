//! Comparable grain version strings.
//!
//! A version string is a comma-separated list of tagged components. Each
//! component is an optional alphabetic tag followed by dotted non-negative
//! integers, e.g. `1.0` or `1.2,custom3.1`. Two versions are only ordered
//! when they carry the same set of tags; otherwise they are
//! [`VersionOrdering::Inconsistent`].
//!
//! # Examples
//!
//! ```
//! use score_sync_core::{VersionOrdering, VersionString};
//!
//! let stored: VersionString = "1.2".parse().unwrap();
//! let model: VersionString = "1.10".parse().unwrap();
//! assert_eq!(model.compare(&stored), VersionOrdering::Greater);
//!
//! let other: VersionString = "1.10,custom1.0".parse().unwrap();
//! assert_eq!(model.compare(&other), VersionOrdering::Inconsistent);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of comparing two [`VersionString`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrdering {
    /// The left-hand version is older.
    Lower,
    /// Both versions carry the same tags with identical numbers.
    Equals,
    /// The left-hand version is newer.
    Greater,
    /// The versions cannot be ordered (different tags, or some tags newer
    /// while others are older).
    Inconsistent,
}

/// Errors raised while parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("version string is empty")]
    Empty,
    #[error("invalid version component '{0}'")]
    InvalidComponent(String),
    #[error("duplicate version tag '{0}'")]
    DuplicateTag(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Component {
    tag: String,
    numbers: Vec<u32>,
}

/// A comparable, tagged, dotted-numeric version.
///
/// Equality ignores the order in which tags were declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionString {
    components: Vec<Component>,
}

impl VersionString {
    /// An untagged version from non-empty numeric parts.
    pub(crate) fn untagged(numbers: &[u32]) -> Self {
        debug_assert!(!numbers.is_empty());
        Self {
            components: vec![Component {
                tag: String::new(),
                numbers: numbers.to_vec(),
            }],
        }
    }

    /// Compares `self` against `other`.
    ///
    /// Returns [`VersionOrdering::Greater`] when `self` is newer than `other`.
    pub fn compare(&self, other: &VersionString) -> VersionOrdering {
        if self.components.len() != other.components.len() {
            return VersionOrdering::Inconsistent;
        }

        let mut greater = false;
        let mut lower = false;
        for mine in &self.components {
            let Some(theirs) = other.component(&mine.tag) else {
                return VersionOrdering::Inconsistent;
            };
            match mine.numbers.cmp(&theirs.numbers) {
                Ordering::Greater => greater = true,
                Ordering::Less => lower = true,
                Ordering::Equal => {}
            }
        }

        match (greater, lower) {
            (false, false) => VersionOrdering::Equals,
            (true, false) => VersionOrdering::Greater,
            (false, true) => VersionOrdering::Lower,
            (true, true) => VersionOrdering::Inconsistent,
        }
    }

    fn component(&self, tag: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.tag == tag)
    }
}

fn parse_component(raw: &str) -> Result<Component, VersionParseError> {
    let invalid = || VersionParseError::InvalidComponent(raw.to_string());

    let split = raw
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (tag, digits) = raw.split_at(split);
    if !tag.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }

    let numbers = digits
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u32>().map_err(|_| invalid())
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Component {
        tag: tag.to_string(),
        numbers,
    })
}

impl FromStr for VersionString {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(VersionParseError::Empty);
        }

        let mut components: Vec<Component> = Vec::new();
        for raw in s.split(',') {
            let component = parse_component(raw.trim())?;
            if components.iter().any(|c| c.tag == component.tag) {
                return Err(VersionParseError::DuplicateTag(component.tag));
            }
            components.push(component);
        }
        Ok(Self { components })
    }
}

impl PartialEq for VersionString {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == VersionOrdering::Equals
    }
}

impl Eq for VersionString {}

impl TryFrom<String> for VersionString {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionString> for String {
    fn from(value: VersionString) -> Self {
        value.to_string()
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(&component.tag)?;
            for (j, n) in component.numbers.iter().enumerate() {
                if j > 0 {
                    f.write_str(".")?;
                }
                write!(f, "{n}")?;
            }
        }
        Ok(())
    }
}
