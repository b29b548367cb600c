//! Version ranges in node-semver syntax.
//!
//! A range is a `||`-separated list of comparator sets; a version satisfies
//! the range when it satisfies every comparator of at least one set.
//! Shorthand forms (`^`, `~`, x-ranges, hyphen ranges) are lowered to plain
//! comparators at parse time, using `-0` upper bounds so that prereleases of
//! the next minor/major never slip in.
//!
//! The text a range was parsed from is kept verbatim and is what gets
//! printed and serialized back out.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::version::{
    PrereleaseComponent, Version, VersionParseError, parse_core_number, parse_prerelease,
};

/// Errors produced by [`VersionRange::parse`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeParseError {
    /// A version inside the range failed to parse.
    #[error("invalid version '{version}' in range '{range}': {source}")]
    InvalidVersion {
        /// Full range text.
        range: String,
        /// The version that failed.
        version: String,
        /// Why it failed.
        #[source]
        source: VersionParseError,
    },

    /// An operator with no operand, or an unknown operator.
    #[error("invalid comparator '{comparator}' in range '{range}'")]
    InvalidComparator {
        /// Full range text.
        range: String,
        /// The offending comparator.
        comparator: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eq,
}

#[derive(Debug, Clone)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    fn test(&self, version: &Version) -> bool {
        let ord = version.cmp(&self.version);
        match self.op {
            Op::Less => ord.is_lt(),
            Op::LessEq => ord.is_le(),
            Op::Greater => ord.is_gt(),
            Op::GreaterEq => ord.is_ge(),
            Op::Eq => ord.is_eq(),
        }
    }
}

/// Comparators that must all hold. Empty means "any version".
#[derive(Debug, Clone, Default)]
struct ComparatorSet(Vec<Comparator>);

impl ComparatorSet {
    fn test(&self, version: &Version, include_prerelease: bool) -> bool {
        if !self.0.iter().all(|c| c.test(version)) {
            return false;
        }
        if !version.is_pre() || include_prerelease {
            return true;
        }
        // a prerelease only passes when some comparator opts into prereleases
        // of that exact major.minor.patch
        self.0
            .iter()
            .any(|c| c.version.is_pre() && c.version.core() == version.core())
    }
}

/// Operator written in front of a partial version.
#[derive(Debug, Clone, Copy)]
enum Prefix {
    Plain,
    Cmp(Op),
    Tilde,
    Caret,
}

/// A possibly incomplete version as written inside a range (`1`, `1.2.x`, `*`).
#[derive(Debug, Clone, Default)]
struct Partial {
    major: Option<u32>,
    minor: Option<u32>,
    patch: Option<u32>,
    prerelease: Vec<PrereleaseComponent>,
}

impl Partial {
    fn parse(text: &str, range: &str) -> Result<Self, RangeParseError> {
        let invalid = |source| RangeParseError::InvalidVersion {
            range: range.to_string(),
            version: text.to_string(),
            source,
        };

        let body = text.strip_prefix('v').unwrap_or(text);
        // build metadata is irrelevant for matching
        let body = body.split_once('+').map_or(body, |(body, _)| body);
        let (core, prerelease) = match body.split_once('-') {
            Some((core, pre)) => (core, parse_prerelease(pre, text).map_err(invalid)?),
            None => (body, Vec::new()),
        };

        let mut partial = Self {
            prerelease,
            ..Self::default()
        };
        if core.is_empty() {
            return Ok(partial);
        }

        let mut components = core.split('.');
        let mut wildcard = false;
        for slot in [&mut partial.major, &mut partial.minor, &mut partial.patch] {
            match components.next() {
                None => break,
                Some("*" | "x" | "X") => {
                    // anything after a wildcard is ignored
                    wildcard = true;
                    break;
                }
                Some(component) => {
                    *slot = Some(parse_core_number(component, text).map_err(invalid)?);
                }
            }
        }
        if !wildcard && components.next().is_some() {
            return Err(invalid(VersionParseError::TooManyComponents(text.to_string())));
        }
        Ok(partial)
    }

    /// Missing components filled with zero.
    fn floor(&self) -> Version {
        Version::new(
            self.major.unwrap_or(0),
            self.minor.unwrap_or(0),
            self.patch.unwrap_or(0),
        )
        .with_prerelease(self.prerelease.clone())
    }

    fn is_full(&self) -> bool {
        self.patch.is_some()
    }
}

/// `major.minor.patch-0`: the lowest version of that release line.
fn lowest(major: u32, minor: u32, patch: u32) -> Version {
    Version::new(major, minor, patch).with_prerelease(vec![PrereleaseComponent::Number(0)])
}

/// Exclusive upper bound for "anything below the next step of `partial`".
fn next_line(major: u32, minor: Option<u32>) -> Version {
    match minor {
        Some(minor) => lowest(major, minor.saturating_add(1), 0),
        None => lowest(major.saturating_add(1), 0, 0),
    }
}

fn lower(prefix: Prefix, partial: &Partial, out: &mut Vec<Comparator>) {
    let Some(major) = partial.major else {
        // `<*` and `>*` can never match
        if matches!(prefix, Prefix::Cmp(Op::Less | Op::Greater)) {
            out.push(Comparator::new(Op::Less, lowest(0, 0, 0)));
        }
        return;
    };

    match prefix {
        Prefix::Caret => {
            let upper = match (partial.minor, partial.patch) {
                (Some(0), Some(patch)) if major == 0 => lowest(0, 0, patch.saturating_add(1)),
                (Some(minor), _) if major == 0 => lowest(0, minor.saturating_add(1), 0),
                _ => lowest(major.saturating_add(1), 0, 0),
            };
            out.push(Comparator::new(Op::GreaterEq, partial.floor()));
            out.push(Comparator::new(Op::Less, upper));
        }
        Prefix::Tilde => {
            out.push(Comparator::new(Op::GreaterEq, partial.floor()));
            out.push(Comparator::new(Op::Less, next_line(major, partial.minor)));
        }
        Prefix::Plain | Prefix::Cmp(Op::Eq) => {
            if partial.is_full() {
                out.push(Comparator::new(Op::Eq, partial.floor()));
            } else {
                out.push(Comparator::new(Op::GreaterEq, partial.floor()));
                out.push(Comparator::new(Op::Less, next_line(major, partial.minor)));
            }
        }
        Prefix::Cmp(Op::Greater) => {
            let comparator = match partial.minor {
                _ if partial.is_full() => Comparator::new(Op::Greater, partial.floor()),
                Some(minor) => Comparator::new(Op::GreaterEq, Version::new(major, minor.saturating_add(1), 0)),
                None => Comparator::new(Op::GreaterEq, Version::new(major.saturating_add(1), 0, 0)),
            };
            out.push(comparator);
        }
        Prefix::Cmp(Op::GreaterEq) => {
            out.push(Comparator::new(Op::GreaterEq, partial.floor()));
        }
        Prefix::Cmp(Op::Less) => {
            let bound = if partial.is_full() {
                partial.floor()
            } else {
                lowest(major, partial.minor.unwrap_or(0), 0)
            };
            out.push(Comparator::new(Op::Less, bound));
        }
        Prefix::Cmp(Op::LessEq) => {
            if partial.is_full() {
                out.push(Comparator::new(Op::LessEq, partial.floor()));
            } else {
                out.push(Comparator::new(Op::Less, next_line(major, partial.minor)));
            }
        }
    }
}

fn split_prefix(token: &str) -> (Prefix, &str) {
    const PREFIXES: [(&str, Prefix); 8] = [
        (">=", Prefix::Cmp(Op::GreaterEq)),
        ("<=", Prefix::Cmp(Op::LessEq)),
        ("~>", Prefix::Tilde),
        (">", Prefix::Cmp(Op::Greater)),
        ("<", Prefix::Cmp(Op::Less)),
        ("=", Prefix::Cmp(Op::Eq)),
        ("~", Prefix::Tilde),
        ("^", Prefix::Caret),
    ];
    for (text, prefix) in PREFIXES {
        if let Some(rest) = token.strip_prefix(text) {
            return (prefix, rest.trim_start_matches('='));
        }
    }
    (Prefix::Plain, token)
}

/// Splits a comparator set into tokens, gluing detached operators (`>= 1.0`)
/// onto their operand.
fn tokenize(text: &str, range: &str) -> Result<Vec<String>, RangeParseError> {
    let mut tokens = Vec::new();
    let mut operator = String::new();
    for word in text.split_whitespace() {
        if word.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            operator.push_str(word);
            continue;
        }
        tokens.push(format!("{operator}{word}"));
        operator.clear();
    }
    if !operator.is_empty() {
        return Err(RangeParseError::InvalidComparator {
            range: range.to_string(),
            comparator: operator,
        });
    }
    Ok(tokens)
}

/// A parsed version range that remembers its source text.
#[derive(Debug, Clone)]
pub struct VersionRange {
    text: String,
    sets: Vec<ComparatorSet>,
    contains_pre: bool,
}

impl VersionRange {
    /// Parses a node-semver range, keeping `text` verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`RangeParseError`] on a malformed comparator or version.
    pub fn parse(text: &str) -> Result<Self, RangeParseError> {
        let mut contains_pre = false;
        let mut sets = Vec::new();

        for alternative in text.split("||") {
            let tokens = tokenize(alternative, text)?;
            let mut comparators = Vec::new();

            match tokens.as_slice() {
                [from, dash, to] if dash == "-" => {
                    let from = Partial::parse(from, text)?;
                    let to = Partial::parse(to, text)?;
                    contains_pre |= !from.prerelease.is_empty() || !to.prerelease.is_empty();
                    if from.major.is_some() {
                        comparators.push(Comparator::new(Op::GreaterEq, from.floor()));
                    }
                    if to.major.is_some() {
                        lower(Prefix::Cmp(Op::LessEq), &to, &mut comparators);
                    }
                }
                _ => {
                    for token in &tokens {
                        let (prefix, operand) = split_prefix(token);
                        let partial = Partial::parse(operand, text)?;
                        contains_pre |= !partial.prerelease.is_empty();
                        lower(prefix, &partial, &mut comparators);
                    }
                }
            }

            sets.push(ComparatorSet(comparators));
        }

        Ok(Self {
            text: text.to_string(),
            sets,
            contains_pre,
        })
    }

    /// `>=version`.
    pub fn same_or_later(version: &Version) -> Self {
        Self {
            text: format!(">={version}"),
            sets: vec![ComparatorSet(vec![Comparator::new(
                Op::GreaterEq,
                version.normalized(),
            )])],
            contains_pre: version.is_pre(),
        }
    }

    /// Exactly `version`.
    pub fn specific(version: &Version) -> Self {
        Self {
            text: version.to_string(),
            sets: vec![ComparatorSet(vec![Comparator::new(Op::Eq, version.normalized())])],
            contains_pre: version.is_pre(),
        }
    }

    /// The text this range was parsed from.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether any comparator as written names a prerelease version.
    pub fn contains_pre(&self) -> bool {
        self.contains_pre
    }

    /// Tests `version` against the range.
    ///
    /// Without `include_prerelease`, a prerelease version only matches a
    /// comparator set that itself mentions a prerelease of the same
    /// `major.minor.patch`.
    pub fn is_satisfied(&self, version: &Version, include_prerelease: bool) -> bool {
        self.sets
            .iter()
            .any(|set| set.test(version, include_prerelease))
    }

    /// [`is_satisfied`](Self::is_satisfied) with prerelease suppression on.
    pub fn matches(&self, version: &Version) -> bool {
        self.is_satisfied(version, false)
    }

    /// [`is_satisfied`](Self::is_satisfied) with the caller's prerelease allowance.
    pub fn match_pre(&self, version: &Version, allow_prerelease: bool) -> bool {
        self.is_satisfied(version, allow_prerelease)
    }
}

impl PartialEq for VersionRange {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for VersionRange {}

impl Hash for VersionRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for VersionRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// The `version` of a root dependency in a project manifest.
///
/// Usually a bare version, which acts as a minimum (`>= version`); a full
/// range is accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyRange(VersionRange);

impl DependencyRange {
    /// A pinned minimum.
    pub fn version(version: &Version) -> Self {
        Self(VersionRange::specific(version))
    }

    /// A full range.
    pub fn range(range: VersionRange) -> Self {
        Self(range)
    }

    /// The pinned minimum when the text is a bare version.
    pub fn as_single_version(&self) -> Option<Version> {
        Version::parse(self.0.as_str()).ok()
    }

    /// Range used for matching: `>= v` for a bare version, otherwise the range itself.
    pub fn as_range(&self) -> VersionRange {
        match self.as_single_version() {
            Some(version) => VersionRange::same_or_later(&version),
            None => self.0.clone(),
        }
    }

    /// Whether `version` satisfies [`as_range`](Self::as_range), prereleases suppressed.
    pub fn matches(&self, version: &Version) -> bool {
        self.as_range().matches(version)
    }

    /// The text as written in the manifest.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for DependencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for DependencyRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DependencyRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        VersionRange::deserialize(deserializer).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_text_is_preserved() {
        for text in [">=1.0.0", "^1.2", "  ~1.2.3 ", "1.x || >=2.5.0 <3", ">= 1.0.0", "*", ""] {
            let range = r(text);
            assert_eq!(range.to_string(), text);
            assert_eq!(serde_json::to_string(&range).unwrap(), format!("\"{text}\""));
        }
        assert_ne!(r(">=1.0.0"), r(">= 1.0.0"));
    }

    #[test]
    fn test_primitive_comparators() {
        assert!(r(">=1.0.0").matches(&v("1.0.0")));
        assert!(r(">=1.0.0").matches(&v("2.0.0")));
        assert!(!r(">1.0.0").matches(&v("1.0.0")));
        assert!(r("<2.0.0").matches(&v("1.9.9")));
        assert!(r("<=2.0.0").matches(&v("2.0.0")));
        assert!(r("=1.2.3").matches(&v("1.2.3")));
        assert!(r("1.2.3").matches(&v("1.2.3")));
        assert!(!r("1.2.3").matches(&v("1.2.4")));
        assert!(r(">=1.0.0 <2.0.0").matches(&v("1.5.0")));
        assert!(!r(">=1.0.0 <2.0.0").matches(&v("2.0.0")));
    }

    #[test]
    fn test_caret() {
        assert!(r("^1.2.3").matches(&v("1.9.0")));
        assert!(!r("^1.2.3").matches(&v("2.0.0")));
        assert!(!r("^1.2.3").matches(&v("1.2.2")));
        assert!(r("^0.2.3").matches(&v("0.2.9")));
        assert!(!r("^0.2.3").matches(&v("0.3.0")));
        assert!(r("^0.0.3").matches(&v("0.0.3")));
        assert!(!r("^0.0.3").matches(&v("0.0.4")));
        assert!(r("^0.0").matches(&v("0.0.9")));
        assert!(!r("^0.0").matches(&v("0.1.0")));
        assert!(r("^1").matches(&v("1.99.0")));
    }

    #[test]
    fn test_tilde_and_x_ranges() {
        assert!(r("~1.2.3").matches(&v("1.2.9")));
        assert!(!r("~1.2.3").matches(&v("1.3.0")));
        assert!(r("~>1.2").matches(&v("1.2.0")));
        assert!(r("~1").matches(&v("1.9.0")));
        assert!(!r("~1").matches(&v("2.0.0")));
        assert!(r("1.x").matches(&v("1.4.0")));
        assert!(r("1.2.*").matches(&v("1.2.7")));
        assert!(!r("1.2.*").matches(&v("1.3.0")));
        assert!(r("*").matches(&v("3.0.0")));
        assert!(r("").matches(&v("0.0.1")));
        assert!(!r("<*").matches(&v("0.0.0")));
    }

    #[test]
    fn test_partial_comparators() {
        assert!(r(">1.2").matches(&v("1.3.0")));
        assert!(!r(">1.2").matches(&v("1.2.9")));
        assert!(r("<=1.2").matches(&v("1.2.9")));
        assert!(!r("<=1.2").matches(&v("1.3.0")));
        assert!(!r("<1.2").matches(&v("1.2.0")));
        assert!(r("<1.2").matches(&v("1.1.9")));
    }

    #[test]
    fn test_hyphen_and_alternatives() {
        assert!(r("1.2.3 - 2.3.4").matches(&v("2.3.4")));
        assert!(!r("1.2.3 - 2.3.4").matches(&v("2.3.5")));
        assert!(r("1.2 - 2.3").matches(&v("2.3.9")));
        assert!(!r("1.2 - 2.3").matches(&v("2.4.0")));
        assert!(r("<1.0.0 || >=3.0.0").matches(&v("3.1.0")));
        assert!(!r("<1.0.0 || >=3.0.0").matches(&v("2.0.0")));
    }

    #[test]
    fn test_prerelease_suppression() {
        // no comparator mentions a prerelease: suppressed
        assert!(!r(">=1.0.0").matches(&v("1.1.0-beta")));
        assert!(r(">=1.0.0").is_satisfied(&v("1.1.0-beta"), true));

        // prerelease on the same major.minor.patch opts in
        assert!(r(">=1.1.0-alpha").matches(&v("1.1.0-beta")));
        assert!(!r(">=1.1.0-alpha").matches(&v("1.2.0-beta")));
        assert!(r(">=1.1.0-alpha").matches(&v("1.2.0")));

        // `-0` upper bounds keep the next major's prereleases out
        assert!(!r("^1.2.3").is_satisfied(&v("2.0.0-alpha"), true));
        assert!(r("^1.2.3").match_pre(&v("1.5.0-rc.1"), true));
    }

    #[test]
    fn test_contains_pre() {
        assert!(r(">=1.0.0-beta").contains_pre());
        assert!(r("1.0.0 - 2.0.0-rc.1").contains_pre());
        assert!(!r("^1.2.3").contains_pre());
        assert!(VersionRange::same_or_later(&v("1.0.0-beta")).contains_pre());
    }

    #[test]
    fn test_same_or_later() {
        let range = VersionRange::same_or_later(&v("1.2"));
        assert_eq!(range.as_str(), ">=1.2");
        assert!(range.matches(&v("1.2.0")));
        assert!(range.matches(&v("5.0.0")));
        assert!(!range.matches(&v("1.1.9")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            VersionRange::parse(">="),
            Err(RangeParseError::InvalidComparator { .. })
        ));
        assert!(matches!(
            VersionRange::parse(">=1.a"),
            Err(RangeParseError::InvalidVersion { .. })
        ));
        assert!(VersionRange::parse("1.2.3.4").is_err());
    }

    #[test]
    fn test_dependency_range() {
        let pinned: DependencyRange = serde_json::from_str("\"1.2.0\"").unwrap();
        assert_eq!(pinned.as_single_version(), Some(v("1.2.0")));
        assert!(pinned.matches(&v("1.3.0")));
        assert!(!pinned.matches(&v("1.1.0")));
        assert_eq!(serde_json::to_string(&pinned).unwrap(), "\"1.2.0\"");

        let ranged: DependencyRange = serde_json::from_str("\"^1.2.0\"").unwrap();
        assert_eq!(ranged.as_single_version(), None);
        assert!(!ranged.matches(&v("2.0.0")));
        assert_eq!(DependencyRange::version(&v("1.0")).as_str(), "1.0");
    }
}
