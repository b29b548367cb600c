//! Editor (Unity) versions, used to filter package candidates by platform
//! compatibility.
//!
//! Editor versions look like `2019.4.31f1`: major, minor, revision, a
//! single-letter release channel and an increment, optionally followed by
//! `-suffix` which is ignored.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Returned when an editor version string is malformed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid editor version '{0}'")]
pub struct PlatformVersionParseError(String);

/// Release channel letter of an editor version.
///
/// Channels have no ordering of their own; [`PlatformVersion`] ranks them,
/// with `f` and `c` sharing a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseChannel {
    /// `a`
    Alpha,
    /// `b`
    Beta,
    /// `f`
    Normal,
    /// `c`, ranked the same as [`Normal`](Self::Normal)
    China,
    /// `p`
    Patch,
    /// `x`
    Experimental,
}

impl ReleaseChannel {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'a' => Some(Self::Alpha),
            'b' => Some(Self::Beta),
            'f' => Some(Self::Normal),
            'c' => Some(Self::China),
            'p' => Some(Self::Patch),
            'x' => Some(Self::Experimental),
            _ => None,
        }
    }

    /// The letter used in version strings.
    pub fn as_char(self) -> char {
        match self {
            Self::Alpha => 'a',
            Self::Beta => 'b',
            Self::Normal => 'f',
            Self::China => 'c',
            Self::Patch => 'p',
            Self::Experimental => 'x',
        }
    }

    /// Position in the editor release order.
    fn rank(self) -> u8 {
        match self {
            Self::Alpha => 0,
            Self::Beta => 1,
            Self::Normal | Self::China => 2,
            Self::Patch => 3,
            Self::Experimental => 4,
        }
    }
}

/// A full editor version such as `2022.3.6f1`.
///
/// Equality follows ordering, so `2022.1.0f1 == 2022.1.0c1`.
#[derive(Debug, Clone, Copy)]
pub struct PlatformVersion {
    major: u16,
    minor: u8,
    revision: u8,
    channel: ReleaseChannel,
    increment: u8,
}

impl PlatformVersion {
    /// Builds a version from its parts.
    pub const fn new(
        major: u16,
        minor: u8,
        revision: u8,
        channel: ReleaseChannel,
        increment: u8,
    ) -> Self {
        Self {
            major,
            minor,
            revision,
            channel,
            increment,
        }
    }

    /// Parses `major.minor.revision<channel><increment>[-suffix]`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformVersionParseError`] when any part is missing or out of range.
    pub fn parse(input: &str) -> Result<Self, PlatformVersionParseError> {
        Self::try_parse(input).ok_or_else(|| PlatformVersionParseError(input.to_string()))
    }

    fn try_parse(input: &str) -> Option<Self> {
        let (major, rest) = input.split_once('.')?;
        let major = major.parse().ok()?;
        let (minor, rest) = rest.split_once('.')?;
        let minor = minor.parse().ok()?;

        let delimiter = rest.find(|c| ReleaseChannel::from_char(c).is_some())?;
        let revision = rest[..delimiter].parse().ok()?;
        let channel = ReleaseChannel::from_char(rest[delimiter..].chars().next()?)?;

        let rest = &rest[delimiter + 1..];
        let increment = rest.split_once('-').map_or(rest, |(increment, _)| increment);
        let increment = increment.parse().ok()?;

        Some(Self::new(major, minor, revision, channel, increment))
    }

    /// Major version, either a year or a legacy `5`-style number.
    pub fn major(&self) -> u16 {
        self.major
    }

    /// Minor version.
    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Revision, the number before the channel letter.
    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Release channel.
    pub fn channel(&self) -> ReleaseChannel {
        self.channel
    }

    /// Increment, the number after the channel letter.
    pub fn increment(&self) -> u8 {
        self.increment
    }
}

/// `1 < 2 < 3 < 4 < 5 < (years) < 6`
fn major_ord(this: u16, other: u16) -> Ordering {
    match (this >= 2000, other >= 2000) {
        (true, true) | (false, false) => this.cmp(&other),
        (true, false) if other <= 5 => Ordering::Greater,
        (true, false) => Ordering::Less,
        (false, true) if this <= 5 => Ordering::Less,
        (false, true) => Ordering::Greater,
    }
}

impl Ord for PlatformVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        major_ord(self.major, other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.revision.cmp(&other.revision))
            .then_with(|| self.channel.rank().cmp(&other.channel.rank()))
            .then_with(|| self.increment.cmp(&other.increment))
    }
}

impl PartialOrd for PlatformVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PlatformVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PlatformVersion {}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}{}{}",
            self.major,
            self.minor,
            self.revision,
            self.channel.as_char(),
            self.increment
        )
    }
}

impl FromStr for PlatformVersion {
    type Err = PlatformVersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The `unity` field of a package descriptor: the minimum `major.minor`
/// editor the package supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartialPlatformVersion {
    major: u16,
    minor: u8,
}

impl PartialPlatformVersion {
    /// The `major.minor` floor.
    pub const fn new(major: u16, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Parses `major.minor`; anything after a further `.` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformVersionParseError`] when either number is missing or invalid.
    pub fn parse(input: &str) -> Result<Self, PlatformVersionParseError> {
        let invalid = || PlatformVersionParseError(input.to_string());
        let (major, rest) = input.trim().split_once('.').ok_or_else(invalid)?;
        let minor = rest.split_once('.').map_or(rest, |(minor, _)| minor);
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }

    /// Required major version.
    pub fn major(&self) -> u16 {
        self.major
    }

    /// Required minor version.
    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Whether an editor at `platform` can use a package requiring `self`.
    pub fn is_compatible_with(&self, platform: &PlatformVersion) -> bool {
        *platform >= PlatformVersion::new(self.major, self.minor, 0, ReleaseChannel::Alpha, 0)
    }
}

impl fmt::Display for PartialPlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Serialize for PartialPlatformVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PartialPlatformVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReleaseChannel::*;

    fn p(s: &str) -> PlatformVersion {
        PlatformVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse() {
        let good = [
            ("5.6.6f1", (5, 6, 6, Normal, 1)),
            ("2019.1.0a1", (2019, 1, 0, Alpha, 1)),
            ("2019.1.0b1", (2019, 1, 0, Beta, 1)),
            ("2019.4.31f1", (2019, 4, 31, Normal, 1)),
            ("2023.3.6f1", (2023, 3, 6, Normal, 1)),
            ("2023.3.6c1", (2023, 3, 6, China, 1)),
            ("2023.3.6p1", (2023, 3, 6, Patch, 1)),
            ("2023.3.6x1", (2023, 3, 6, Experimental, 1)),
            ("2019.1.0a1-EXTRA", (2019, 1, 0, Alpha, 1)),
        ];
        for (input, (major, minor, revision, channel, increment)) in good {
            let version = p(input);
            assert_eq!(version.major(), major, "{input}");
            assert_eq!(version.minor(), minor, "{input}");
            assert_eq!(version.revision(), revision, "{input}");
            assert_eq!(version.channel().as_char(), channel.as_char(), "{input}");
            assert_eq!(version.increment(), increment, "{input}");
        }

        for bad in ["2022", "2019.0", "5.6.6", "2023.4.6f", "x.1.0f1"] {
            assert!(PlatformVersion::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_ordering() {
        let chain = ["5.6.5f1", "5.6.6f1", "5.6.6f2", "2022.1.0a1", "2022.1.0f1", "6000.0.0f1"];
        for pair in chain.windows(2) {
            assert!(p(pair[0]) < p(pair[1]), "{} < {}", pair[0], pair[1]);
            assert!(p(pair[1]) > p(pair[0]), "{} > {}", pair[1], pair[0]);
        }
        assert_eq!(p("2022.1.0f1").cmp(&p("2022.1.0c1")), Ordering::Equal);
        assert_eq!(p("2022.1.0f1"), p("2022.1.0c1"));
    }

    #[test]
    fn test_channel_ranks() {
        let chain = ["2022.1.0a1", "2022.1.0b1", "2022.1.0f1", "2022.1.0p1", "2022.1.0x1"];
        for pair in chain.windows(2) {
            assert!(p(pair[0]) < p(pair[1]), "{} < {}", pair[0], pair[1]);
        }
        assert!(p("2022.1.0b1") < p("2022.1.0c1"));
        assert!(p("2022.1.0c1") < p("2022.1.0p1"));
    }

    #[test]
    fn test_channel_equality_is_by_letter() {
        // the shared rank only applies to whole versions
        assert_ne!(Normal, China);
        assert_eq!(China, China);
        assert_eq!(p("2022.1.0f1").channel(), Normal);
        assert_eq!(p("2022.1.0c1").channel(), China);
        assert_eq!(p("2022.1.0f1"), p("2022.1.0c1"));
        assert_eq!(p("2022.1.0c1").to_string(), "2022.1.0c1");
    }

    #[test]
    fn test_partial_compatibility() {
        let unity = PartialPlatformVersion::parse("2019.4").unwrap();
        assert!(unity.is_compatible_with(&p("2019.4.0a1")));
        assert!(unity.is_compatible_with(&p("2022.3.6f1")));
        assert!(!unity.is_compatible_with(&p("2019.3.9f1")));
        assert_eq!(PartialPlatformVersion::parse("2022.3.1f1"), Ok(PartialPlatformVersion::new(2022, 3)));
        assert!(PartialPlatformVersion::parse("2019").is_err());
    }
}
