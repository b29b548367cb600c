//! Semantic versions as published in VPM package descriptors.
//!
//! Minor and patch are optional so that shorthand such as `1` or `1.2`
//! survives a parse/print round trip. Missing components compare as zero,
//! and build metadata never takes part in comparison.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors produced by [`Version::parse`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionParseError {
    /// The input was empty or whitespace only.
    #[error("empty version string")]
    Empty,

    /// More than three dot-separated core components.
    #[error("too many version components in '{0}'")]
    TooManyComponents(String),

    /// A core component was missing, non-numeric or out of range.
    #[error("invalid version component '{component}' in '{input}'")]
    InvalidComponent {
        /// Full input text.
        input: String,
        /// The offending component.
        component: String,
    },

    /// A prerelease identifier between dots was empty (`1.0.0-alpha..1`).
    #[error("empty prerelease identifier in '{0}'")]
    EmptyPrerelease(String),

    /// Build metadata marker present with nothing after it.
    #[error("empty build metadata in '{0}'")]
    EmptyBuild(String),
}

/// One dot-separated identifier of a prerelease tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrereleaseComponent {
    /// Purely numeric identifier without leading zeros.
    Number(u64),
    /// Anything else, compared by ordinal bytes.
    Alphanumeric(String),
}

impl PrereleaseComponent {
    fn parse(identifier: &str) -> Self {
        let canonical_number = identifier.bytes().all(|b| b.is_ascii_digit())
            && (identifier == "0" || !identifier.starts_with('0'));
        match identifier.parse() {
            Ok(number) if canonical_number => Self::Number(number),
            _ => Self::Alphanumeric(identifier.to_string()),
        }
    }
}

impl Ord for PrereleaseComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Number(_), Self::Alphanumeric(_)) => Ordering::Less,
            (Self::Alphanumeric(_), Self::Number(_)) => Ordering::Greater,
            (Self::Alphanumeric(a), Self::Alphanumeric(b)) => a.as_bytes().cmp(b.as_bytes()),
        }
    }
}

impl PartialOrd for PrereleaseComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PrereleaseComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Alphanumeric(s) => f.write_str(s),
        }
    }
}

/// A package version: `major[.minor[.patch]][-prerelease][+build]`.
///
/// Equality, ordering and hashing all ignore `build` and treat a missing
/// minor/patch as `0`, so `1 == 1.0 == 1.0.0+meta`.
#[derive(Debug, Clone)]
pub struct Version {
    major: u32,
    minor: Option<u32>,
    patch: Option<u32>,
    prerelease: Vec<PrereleaseComponent>,
    build: Option<String>,
}

impl Version {
    /// A full `major.minor.patch` release version.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor: Some(minor),
            patch: Some(patch),
            prerelease: Vec::new(),
            build: None,
        }
    }

    /// Replaces the prerelease tag.
    pub fn with_prerelease(mut self, prerelease: Vec<PrereleaseComponent>) -> Self {
        self.prerelease = prerelease;
        self
    }

    /// Parses a version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionParseError`] on empty input, more than three core
    /// components, a non-numeric component or an empty identifier.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let (rest, build) = match text.split_once('+') {
            Some((_, "")) => return Err(VersionParseError::EmptyBuild(input.to_string())),
            Some((rest, build)) => (rest, Some(build.to_string())),
            None => (text, None),
        };

        let (core, prerelease) = match rest.split_once('-') {
            Some((core, pre)) => (core, parse_prerelease(pre, input)?),
            None => (rest, Vec::new()),
        };

        let mut parts = core.split('.');
        let major = parse_core_number(parts.next().unwrap_or_default(), input)?;
        let minor = parts.next().map(|p| parse_core_number(p, input)).transpose()?;
        let patch = parts.next().map(|p| parse_core_number(p, input)).transpose()?;
        if parts.next().is_some() {
            return Err(VersionParseError::TooManyComponents(input.to_string()));
        }

        Ok(Self {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }

    /// Major component.
    pub fn major(&self) -> u32 {
        self.major
    }

    /// Minor component, `0` when omitted.
    pub fn minor(&self) -> u32 {
        self.minor.unwrap_or(0)
    }

    /// Patch component, `0` when omitted.
    pub fn patch(&self) -> u32 {
        self.patch.unwrap_or(0)
    }

    /// Prerelease identifiers, empty for a release.
    pub fn prerelease(&self) -> &[PrereleaseComponent] {
        &self.prerelease
    }

    /// Build metadata after `+`.
    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }

    /// Whether the version carries a prerelease tag.
    pub fn is_pre(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// `(major, minor, patch)` with omitted components filled in.
    pub fn core(&self) -> (u32, u32, u32) {
        (self.major, self.minor(), self.patch())
    }

    /// Same version with every component spelled out and no build metadata.
    pub fn normalized(&self) -> Self {
        Self::new(self.major, self.minor(), self.patch()).with_prerelease(self.prerelease.clone())
    }
}

pub(crate) fn parse_core_number(component: &str, input: &str) -> Result<u32, VersionParseError> {
    let invalid = || VersionParseError::InvalidComponent {
        input: input.to_string(),
        component: component.to_string(),
    };
    if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    component.parse().map_err(|_| invalid())
}

pub(crate) fn parse_prerelease(
    prerelease: &str,
    input: &str,
) -> Result<Vec<PrereleaseComponent>, VersionParseError> {
    prerelease
        .split('.')
        .map(|identifier| {
            if identifier.is_empty() {
                Err(VersionParseError::EmptyPrerelease(input.to_string()))
            } else {
                Ok(PrereleaseComponent::parse(identifier))
            }
        })
        .collect()
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core().hash(state);
        self.prerelease.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.core().cmp(&other.core()).then_with(|| {
            match (self.is_pre(), other.is_pre()) {
                (false, false) => Ordering::Equal,
                (false, true) => Ordering::Greater,
                (true, false) => Ordering::Less,
                // lexicographic: a shorter prefix sorts first
                (true, true) => self.prerelease.cmp(&other.prerelease),
            }
        })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;
        if let Some(minor) = self.minor {
            write!(f, ".{minor}")?;
        }
        if let Some(patch) = self.patch {
            write!(f, ".{patch}")?;
        }
        for (i, component) in self.prerelease.iter().enumerate() {
            f.write_str(if i == 0 { "-" } else { "." })?;
            write!(f, "{component}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
