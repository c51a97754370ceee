use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::Visitor;
use serde::{Deserialize, Serialize};

/// `1.24`, `1.24.3`, `1.24rc1`, with an optional `go` prefix.
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:go)?(\d+)\.(\d+)(?:\.(\d+))?(?:(rc|beta|alpha)(\d*))?$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    Alpha,
    Beta,
    Rc,
    Stable,
}

impl Channel {
    fn as_str(self) -> &'static str {
        match self {
            Channel::Alpha => "alpha",
            Channel::Beta => "beta",
            Channel::Rc => "rc",
            Channel::Stable => "",
        }
    }
}

/// A Go toolchain version, such as `1.24.3` or `1.24rc1`.
///
/// The patch component is optional because early patch releases of a line were
/// published without one (`go1.14` and `go1.14.0` are distinct catalog entries
/// naming the same release). Ordering treats a missing patch as zero, so those
/// two compare equal while displaying differently.
///
/// The prerelease number is kept as its original digit string and compared
/// lexicographically, so `rc9` ranks above `rc10`.
#[derive(Debug, Clone)]
pub struct Version {
    major: u32,
    minor: u32,
    patch: Option<u32>,
    channel: Channel,
    pre: Option<String>,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: Option<u32>) -> Self {
        Self {
            major,
            minor,
            patch,
            channel: Channel::Stable,
            pre: None,
        }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> Option<u32> {
        self.patch
    }

    /// `true` when the version carries no `rc`/`beta`/`alpha` suffix.
    pub fn is_stable(&self) -> bool {
        self.channel == Channel::Stable
    }

    /// `true` when both versions sit on the same `major.minor` line.
    pub fn same_line(&self, major: u32, minor: u32) -> bool {
        self.major == major && self.minor == minor
    }

    /// The installation directory name, e.g. `go1.24.3`.
    pub fn dir_name(&self) -> String {
        format!("go{self}")
    }

    fn cmp_key(&self) -> (u32, u32, u32, Channel, &str) {
        (
            self.major,
            self.minor,
            self.patch.unwrap_or(0),
            self.channel,
            self.pre.as_deref().unwrap_or(""),
        )
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_key() == other.cmp_key()
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.cmp_key().hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key().cmp(&other.cmp_key())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(patch) = self.patch {
            write!(f, ".{patch}")?;
        }
        if self.channel != Channel::Stable {
            write!(f, "{}", self.channel.as_str())?;
            if let Some(pre) = &self.pre {
                write!(f, "{pre}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("`{0}` is not a valid Go version (expected e.g. `1.24`, `1.24.3` or `1.24rc1`)")]
pub struct InvalidVersion(pub String);

impl FromStr for Version {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = VERSION_RE
            .captures(s.trim())
            .ok_or_else(|| InvalidVersion(s.to_string()))?;

        let number = |idx: usize| -> Option<u32> {
            captures
                .get(idx)
                .filter(|m| !m.as_str().is_empty())
                .map(|m| m.as_str().parse().expect("The regex only matches digits"))
        };

        let channel = match captures.get(4).map(|m| m.as_str()) {
            Some("rc") => Channel::Rc,
            Some("beta") => Channel::Beta,
            Some("alpha") => Channel::Alpha,
            _ => Channel::Stable,
        };

        Ok(Self {
            major: number(1).expect("The major component is mandatory"),
            minor: number(2).expect("The minor component is mandatory"),
            patch: number(3),
            channel,
            pre: captures
                .get(5)
                .filter(|m| !m.as_str().is_empty())
                .map(|m| m.as_str().to_string()),
        })
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

struct VersionVisitor;

impl Visitor<'_> for VersionVisitor {
    type Value = Version;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a Go version, optionally prefixed by `go` (e.g. `go1.24.3`)")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse().map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(VersionVisitor)
    }
}

/// A user-supplied version request, before resolution against a catalog or the
/// installed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// A fully qualified version, e.g. `1.24.3` or `1.24rc1`.
    Exact(Version),
    /// A `major.minor` line, resolved to the highest patch release.
    Partial { major: u32, minor: u32 },
    /// The highest released version.
    Latest,
    /// The highest non-prerelease version.
    Stable,
    /// A `PREFIX*` pattern expanding to every matching version.
    Wildcard(String),
}

impl VersionSpec {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, VersionSpec::Wildcard(_))
    }

    /// Whether a concrete version satisfies this spec.
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            VersionSpec::Exact(exact) => version == exact,
            VersionSpec::Partial { major, minor } => version.same_line(*major, *minor),
            VersionSpec::Latest => true,
            VersionSpec::Stable => version.is_stable(),
            VersionSpec::Wildcard(pattern) => wildcard_matches(pattern, version),
        }
    }

    /// Resolve against a set of versions (descending preference), or `None`.
    ///
    /// Exact display-form matches win; a `major.minor` line picks its highest
    /// member; `latest`/`stable` pick the highest (stable) version; wildcards
    /// pick the highest match.
    pub fn best_match<'a>(&self, versions: impl IntoIterator<Item = &'a Version>) -> Option<Version> {
        let versions = versions.into_iter().collect::<Vec<_>>();

        match self {
            VersionSpec::Exact(exact) => {
                let wanted = exact.to_string();
                versions
                    .iter()
                    .copied()
                    .find(|v| v.to_string() == wanted)
                    .or_else(|| versions.iter().copied().find(|v| *v == exact))
                    .cloned()
            }
            VersionSpec::Partial { major, minor } => versions
                .iter()
                .filter(|v| v.same_line(*major, *minor))
                .max()
                .map(|v| (*v).clone()),
            VersionSpec::Latest | VersionSpec::Stable => versions
                .iter()
                .filter(|v| v.is_stable())
                .max()
                .map(|v| (*v).clone())
                .or_else(|| versions.into_iter().max().cloned()),
            VersionSpec::Wildcard(pattern) => versions
                .iter()
                .filter(|v| wildcard_matches(pattern, v))
                .max()
                .map(|v| (*v).clone()),
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Exact(version) => write!(f, "{version}"),
            VersionSpec::Partial { major, minor } => write!(f, "{major}.{minor}"),
            VersionSpec::Latest => write!(f, "latest"),
            VersionSpec::Stable => write!(f, "stable"),
            VersionSpec::Wildcard(pattern) => write!(f, "{pattern}"),
        }
    }
}

impl FromStr for VersionSpec {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "latest" => return Ok(VersionSpec::Latest),
            "stable" => return Ok(VersionSpec::Stable),
            "*" => return Ok(VersionSpec::Wildcard("*".to_string())),
            _ => {}
        }

        if let Some(prefix) = s.strip_suffix('*') {
            // The prefix itself must look like the start of a version.
            if prefix.is_empty()
                || !prefix
                    .strip_prefix("go")
                    .unwrap_or(prefix)
                    .chars()
                    .all(|c| c.is_ascii_digit() || c == '.')
            {
                return Err(InvalidVersion(s.to_string()));
            }
            return Ok(VersionSpec::Wildcard(s.to_string()));
        }

        let version = Version::from_str(s)?;
        if version.patch().is_none() && version.is_stable() {
            return Ok(VersionSpec::Partial {
                major: version.major(),
                minor: version.minor(),
            });
        }
        Ok(VersionSpec::Exact(version))
    }
}

/// `PREFIX*` matches V when V equals the stripped prefix, continues it with a
/// `.`, or continues it with a non-digit — so `1.14.*` covers `1.14`,
/// `1.14.2` and `1.14rc1` but not `1.141.0`.
fn wildcard_matches(pattern: &str, version: &Version) -> bool {
    let prefix = pattern
        .strip_prefix("go")
        .unwrap_or(pattern)
        .trim_end_matches('*')
        .trim_end_matches('.');

    if prefix.is_empty() {
        return true;
    }

    let rendered = version.to_string();
    if rendered == prefix {
        return true;
    }
    if let Some(rest) = rendered.strip_prefix(prefix) {
        let next = rest.chars().next();
        return matches!(next, Some('.')) || matches!(next, Some(c) if !c.is_ascii_digit());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display_round_trip() {
        for raw in ["1.24", "1.24.3", "1.24rc1", "1.18beta1", "1.25.0alpha2"] {
            assert_eq!(v(raw).to_string(), raw);
        }
        // The `go` prefix is tolerated on input, never produced on output.
        assert_eq!(v("go1.24.3").to_string(), "1.24.3");
        assert_eq!(v("go1.24.3").dir_name(), "go1.24.3");
    }

    #[test]
    fn parse_rejects_garbage() {
        for raw in ["", "1", "go", "1.x", "1.24.3.4", "v1.24", "1.24-rc1"] {
            assert!(Version::from_str(raw).is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn ordering_ranks_channels_below_stable() {
        assert!(v("1.24.0") > v("1.24rc1"));
        assert!(v("1.24rc2") > v("1.24rc1"));
        assert!(v("1.24rc1") > v("1.24beta2"));
        assert!(v("1.24beta1") > v("1.24alpha3"));
        assert!(v("1.25rc1") > v("1.24.7"));
        assert!(v("1.24.10") > v("1.24.9"));
        assert_eq!(v("1.14"), v("1.14.0"));
    }

    #[test]
    fn prerelease_numbers_compare_lexicographically() {
        // "10" sorts before "9" as a string.
        assert!(v("1.24rc9") > v("1.24rc10"));
        assert!(v("1.24beta9") > v("1.24beta11"));
        // A bare channel sorts below any numbered one.
        assert!(v("1.24rc1") > v("1.24rc"));
    }

    #[test]
    fn spec_parsing() {
        assert_eq!("latest".parse::<VersionSpec>().unwrap(), VersionSpec::Latest);
        assert_eq!("stable".parse::<VersionSpec>().unwrap(), VersionSpec::Stable);
        assert_eq!(
            "1.24".parse::<VersionSpec>().unwrap(),
            VersionSpec::Partial {
                major: 1,
                minor: 24
            }
        );
        assert_eq!(
            "1.24.3".parse::<VersionSpec>().unwrap(),
            VersionSpec::Exact(v("1.24.3"))
        );
        // A prerelease without a patch is already fully qualified.
        assert_eq!(
            "1.24rc1".parse::<VersionSpec>().unwrap(),
            VersionSpec::Exact(v("1.24rc1"))
        );
        assert!(matches!(
            "1.14.*".parse::<VersionSpec>().unwrap(),
            VersionSpec::Wildcard(_)
        ));
        assert!("nope*".parse::<VersionSpec>().is_err());
        assert!("one.two".parse::<VersionSpec>().is_err());
    }

    #[test]
    fn wildcard_includes_prereleases_and_bare_line() {
        let pool = ["1.14", "1.14.0", "1.14.2", "1.14rc1", "1.15.0", "1.141.0"]
            .map(|s| v(s));
        let spec: VersionSpec = "1.14.*".parse().unwrap();

        let mut matched: Vec<String> = pool
            .iter()
            .filter(|candidate| spec.matches(candidate))
            .map(ToString::to_string)
            .collect();
        matched.sort();

        assert_eq!(matched, ["1.14", "1.14.0", "1.14.2", "1.14rc1"]);
    }

    #[test]
    fn star_matches_everything() {
        let spec: VersionSpec = "*".parse().unwrap();
        assert!(spec.matches(&v("1.14rc1")));
        assert!(spec.matches(&v("2.0.0")));
    }

    #[test]
    fn partial_resolves_to_highest_patch() {
        let installed = ["1.25.1", "1.25.9", "1.26.0"].map(|s| v(s));
        let spec = VersionSpec::Partial {
            major: 1,
            minor: 25,
        };
        assert_eq!(spec.best_match(&installed), Some(v("1.25.9")));

        let missing = VersionSpec::Partial {
            major: 1,
            minor: 27,
        };
        assert_eq!(missing.best_match(&installed), None);
    }

    #[test]
    fn latest_prefers_stable_over_newer_prerelease() {
        let installed = ["1.24.3", "1.25rc1"].map(|s| v(s));
        assert_eq!(VersionSpec::Latest.best_match(&installed), Some(v("1.24.3")));
        assert_eq!(VersionSpec::Stable.best_match(&installed), Some(v("1.24.3")));
    }

    #[test]
    fn exact_match_prefers_display_form() {
        // `1.14` and `1.14.0` compare equal; an exact request returns the
        // entry spelled the same way when both are present.
        let installed = ["1.14.0", "1.14"].map(|s| v(s));
        let spec = VersionSpec::Exact(v("1.14"));
        assert_eq!(
            spec.best_match(&installed).map(|m| m.to_string()),
            Some("1.14".to_string())
        );
    }
}
