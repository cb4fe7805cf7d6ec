//! Release identifiers and their two orderings.
//!
//! A [`Version`] is parsed from `MAJOR[.MINOR[.PATCH]][-(SNAPSHOT|<MATURITY><N>)]`
//! where MATURITY is one of `M`, `alpha`, `beta`, `RC` (case-insensitive).
//!
//! # Orderings
//!
//! - [`Version::semantic_cmp`] is the ascending order used to sequence migration
//!   steps: `1.0.0-M1 < 1.0.0-alpha1 < 1.0.0-beta1 < 1.0.0-RC1 < 1.0.0-SNAPSHOT < 1.0.0`.
//! - [`Version::natural_cmp`] is the legacy listing order and the exact reverse:
//!   sorting ascending with it yields the newest version first. [`NewestFirst`]
//!   wraps a version so that std collections sort it this way.
//!
//! `Version` deliberately does not implement `Ord`; call sites pick a direction.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::VersionParseError;

static VERSION_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn version_pattern() -> Option<&'static Regex> {
    VERSION_PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:-(?:((?i:SNAPSHOT))|((?i:M|alpha|beta|RC))(\d+)?))?$",
            )
            .ok()
        })
        .as_ref()
}

/// Pre-release classification of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Maturity {
    /// Milestone build (`M`).
    Milestone,
    /// Alpha build.
    Alpha,
    /// Beta build.
    Beta,
    /// Release candidate (`RC`).
    ReleaseCandidate,
    /// Final release.
    Release,
}

impl Maturity {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "m" => Some(Self::Milestone),
            "alpha" => Some(Self::Alpha),
            "beta" => Some(Self::Beta),
            "rc" => Some(Self::ReleaseCandidate),
            _ => None,
        }
    }

    /// Canonical suffix token, `None` for releases.
    #[must_use]
    pub const fn token(self) -> Option<&'static str> {
        match self {
            Self::Milestone => Some("M"),
            Self::Alpha => Some("alpha"),
            Self::Beta => Some("beta"),
            Self::ReleaseCandidate => Some("RC"),
            Self::Release => None,
        }
    }
}

/// A parsed, immutable release identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: u32,
    minor: u32,
    patch: u32,
    maturity: Maturity,
    type_version: u32,
    snapshot: bool,
}

impl Version {
    /// Parses a version string.
    ///
    /// Missing minor/patch default to 0; a maturity without a number
    /// defaults to type-version 1.
    ///
    /// # Errors
    /// Returns `VersionParseError` if `text` does not match the grammar.
    ///
    /// # Examples
    ///
    /// ```
    /// use stepledger::Version;
    ///
    /// let v = Version::parse("1.1-SNAPSHOT").unwrap();
    /// assert_eq!(v.parsed_version(), "1.1.0-SNAPSHOT");
    /// ```
    pub fn parse(text: &str) -> Result<Self, VersionParseError> {
        let caps = version_pattern()
            .and_then(|re| re.captures(text))
            .ok_or_else(|| VersionParseError::new(text))?;

        let number = |idx: usize| -> Result<u32, VersionParseError> {
            caps.get(idx)
                .map_or(Ok(0), |m| m.as_str().parse::<u32>())
                .map_err(|_| VersionParseError::new(text))
        };

        let major = number(1)?;
        let minor = number(2)?;
        let patch = number(3)?;
        let snapshot = caps.get(4).is_some();

        let (maturity, type_version) = match caps.get(5) {
            Some(token) => {
                let maturity =
                    Maturity::from_token(token.as_str()).ok_or_else(|| VersionParseError::new(text))?;
                let type_version = match caps.get(6) {
                    Some(n) => n.as_str().parse::<u32>().map_err(|_| VersionParseError::new(text))?,
                    None => 1,
                };
                if type_version == 0 {
                    return Err(VersionParseError::new(text));
                }
                (maturity, type_version)
            }
            None => (Maturity::Release, 0),
        };

        Ok(Self {
            major,
            minor,
            patch,
            maturity,
            type_version,
            snapshot,
        })
    }

    /// Creates a final release version.
    #[must_use]
    pub const fn release(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            maturity: Maturity::Release,
            type_version: 0,
            snapshot: false,
        }
    }

    /// Major component.
    #[must_use]
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Minor component.
    #[must_use]
    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// Patch component.
    #[must_use]
    pub const fn patch(&self) -> u32 {
        self.patch
    }

    /// Maturity classification.
    #[must_use]
    pub const fn maturity(&self) -> Maturity {
        self.maturity
    }

    /// Number following the maturity token (`3` in `RC3`); 0 for releases.
    #[must_use]
    pub const fn type_version(&self) -> u32 {
        self.type_version
    }

    /// True for `-SNAPSHOT` versions.
    #[must_use]
    pub const fn is_snapshot(&self) -> bool {
        self.snapshot
    }

    /// Canonical normalized rendering, always including the patch component.
    #[must_use]
    pub fn parsed_version(&self) -> String {
        self.to_string()
    }

    // M < alpha < beta < RC < SNAPSHOT < release
    const fn maturity_rank(&self) -> u8 {
        if self.snapshot {
            return 4;
        }
        match self.maturity {
            Maturity::Milestone => 0,
            Maturity::Alpha => 1,
            Maturity::Beta => 2,
            Maturity::ReleaseCandidate => 3,
            Maturity::Release => 5,
        }
    }

    /// Ascending semantic order: older versions compare `Less`.
    #[must_use]
    pub fn semantic_cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| self.maturity_rank().cmp(&other.maturity_rank()))
            .then_with(|| self.type_version.cmp(&other.type_version))
    }

    /// Legacy listing order, the reverse of [`Version::semantic_cmp`].
    ///
    /// Sorting ascending with this comparator puts the newest version first.
    #[must_use]
    pub fn natural_cmp(&self, other: &Self) -> Ordering {
        self.semantic_cmp(other).reverse()
    }

    /// True if `self` is semantically newer than `other`.
    #[must_use]
    pub fn is_newer(&self, other: &Self) -> bool {
        self.semantic_cmp(other) == Ordering::Greater
    }

    /// True if `self` is semantically older than `other`.
    #[must_use]
    pub fn is_older(&self, other: &Self) -> bool {
        self.semantic_cmp(other) == Ordering::Less
    }

    /// True if `self` is newer than or equal to `other`.
    #[must_use]
    pub fn is_newer_or_equal(&self, other: &Self) -> bool {
        self.semantic_cmp(other) != Ordering::Less
    }

    /// True if `self` is older than or equal to `other`.
    #[must_use]
    pub fn is_older_or_equal(&self, other: &Self) -> bool {
        self.semantic_cmp(other) != Ordering::Greater
    }

    /// Parses `other` and checks whether `self` is newer.
    ///
    /// # Errors
    /// Returns `VersionParseError` if `other` is malformed.
    pub fn is_newer_than_str(&self, other: &str) -> Result<bool, VersionParseError> {
        Ok(self.is_newer(&Self::parse(other)?))
    }

    /// Parses `other` and checks whether `self` is older.
    ///
    /// # Errors
    /// Returns `VersionParseError` if `other` is malformed.
    pub fn is_older_than_str(&self, other: &str) -> Result<bool, VersionParseError> {
        Ok(self.is_older(&Self::parse(other)?))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.snapshot {
            return f.write_str("-SNAPSHOT");
        }
        if let Some(token) = self.maturity.token() {
            write!(f, "-{token}{}", self.type_version)?;
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

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// Wrapper ordering versions newest-first, for listings.
///
/// ```
/// use stepledger::{NewestFirst, Version};
///
/// let mut versions = vec![
///     NewestFirst(Version::parse("1.0").unwrap()),
///     NewestFirst(Version::parse("2.0").unwrap()),
/// ];
/// versions.sort();
/// assert_eq!(versions[0].0.to_string(), "2.0.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewestFirst(pub Version);

impl Ord for NewestFirst {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.natural_cmp(&other.0)
    }
}

impl PartialOrd for NewestFirst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sorts versions in place by the legacy natural order (newest first).
pub fn sort_natural(versions: &mut [Version]) {
    versions.sort_by(Version::natural_cmp);
}

/// Sorts versions in place oldest first.
pub fn sort_semantic(versions: &mut [Version]) {
    versions.sort_by(Version::semantic_cmp);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_missing_components_default_to_zero() {
        assert_eq!(v("1.0").parsed_version(), "1.0.0");
        assert_eq!(v("3").parsed_version(), "3.0.0");
        assert_eq!(v("2.3.14").parsed_version(), "2.3.14");
    }

    #[test]
    fn test_snapshot_rendering() {
        let version = v("1.1-SNAPSHOT");
        assert!(version.is_snapshot());
        assert_eq!(version.maturity(), Maturity::Release);
        assert_eq!(version.parsed_version(), "1.1.0-SNAPSHOT");
    }

    #[test]
    fn test_maturity_without_number_defaults_to_one() {
        let version = v("1.0-alpha");
        assert_eq!(version.maturity(), Maturity::Alpha);
        assert_eq!(version.type_version(), 1);
        assert_eq!(version.parsed_version(), "1.0.0-alpha1");
    }

    #[test]
    fn test_release_candidate() {
        let version = v("2.1.2-RC3");
        assert_eq!(version.maturity(), Maturity::ReleaseCandidate);
        assert_eq!(version.type_version(), 3);
    }

    #[test]
    fn test_maturity_is_case_insensitive() {
        assert_eq!(v("1.0-BETA2").maturity(), Maturity::Beta);
        assert_eq!(v("1.0-rc1").parsed_version(), "1.0.0-RC1");
        assert_eq!(v("1.0-m4").parsed_version(), "1.0.0-M4");
        assert!(v("1.0-snapshot").is_snapshot());
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "aaaa", "", "1.", "1.2.3.4", "1.0-gamma1", "1.0-SNAPSHOT1", "-1.0", "1.0-RC0", "1.0-",
            " 1.0", "1.0 ", "1.0\n",
        ] {
            assert!(Version::parse(bad).is_err(), "expected '{bad}' to be rejected");
        }
    }

    #[test]
    fn test_rejects_overflowing_component() {
        assert!(Version::parse("99999999999.0").is_err());
    }

    #[test]
    fn test_semantic_ordering_prerelease() {
        assert!(v("1.1").is_newer(&v("1.1-alpha1")));
        assert!(v("1.1").is_newer(&v("1.1-RC5")));
        assert!(v("1.1-SNAPSHOT").is_newer(&v("1.1-RC5")));
        assert!(v("1.1-SNAPSHOT").is_older(&v("1.1")));
        assert!(v("1.1-beta2").is_newer(&v("1.1-beta1")));
        assert!(!v("1.0").is_newer(&v("1.0.1")));
        assert!(v("1.0").is_older(&v("1.0.1")));
    }

    #[test]
    fn test_equal_versions() {
        assert!(!v("1.0").is_newer(&v("1.0.0")));
        assert!(!v("1.0").is_older(&v("1.0.0")));
        assert!(v("1.0").is_newer_or_equal(&v("1.0.0")));
        assert!(v("1.0").is_older_or_equal(&v("1.0.0")));
        assert_eq!(v("1.0"), v("1.0.0"));
    }

    #[test]
    fn test_natural_is_reverse_of_semantic() {
        let a = v("2.0");
        let b = v("1.9.9");
        assert_eq!(a.semantic_cmp(&b), Ordering::Greater);
        assert_eq!(a.natural_cmp(&b), Ordering::Less);
    }

    #[test]
    fn test_string_comparisons() {
        assert!(v("1.1").is_newer_than_str("1.1-alpha1").unwrap());
        assert!(v("1.0").is_older_than_str("1.0.1").unwrap());
        assert!(v("1.0").is_newer_than_str("nope").is_err());
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let json = serde_json::to_string(&v("1.2-beta")).unwrap();
        assert_eq!(json, "\"1.2.0-beta1\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("1.2.0-beta1"));
        assert!(serde_json::from_str::<Version>("\"x.y\"").is_err());
    }

    #[test]
    fn test_release_constructor() {
        assert_eq!(Version::release(4, 2, 0), v("4.2"));
    }
}
