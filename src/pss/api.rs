use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::KubesecError;

/// Pod Security Standards profile, from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Privileged,
    Baseline,
    Restricted,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Privileged => "privileged",
            Self::Baseline => "baseline",
            Self::Restricted => "restricted",
        }
    }
}

impl FromStr for Level {
    type Err = KubesecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "privileged" => Ok(Self::Privileged),
            "baseline" => Ok(Self::Baseline),
            "restricted" => Ok(Self::Restricted),
            other => Err(KubesecError::InvalidPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A policy version: a Kubernetes minor release, or `latest`, which sorts
/// after every release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    MajorMinor(u32, u32),
    Latest,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self::MajorMinor(major, minor)
    }

    /// Whether checks introduced at `min` apply to this version.
    pub fn at_least(self, min: Version) -> bool {
        self >= min
    }
}

impl FromStr for Version {
    type Err = KubesecError;

    /// Accepts `latest` or `v<major>.<minor>` with major version 1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "latest" {
            return Ok(Self::Latest);
        }
        let invalid = || KubesecError::InvalidPolicyVersion(s.to_string());

        let rest = s.strip_prefix('v').ok_or_else(invalid)?;
        let (major, minor) = rest.split_once('.').ok_or_else(invalid)?;
        let major: u32 = major.parse().map_err(|_| invalid())?;
        let minor: u32 = minor.parse().map_err(|_| invalid())?;
        if major != 1 {
            return Err(invalid());
        }
        Ok(Self::new(major, minor))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MajorMinor(major, minor) => write!(f, "v{major}.{minor}"),
            Self::Latest => f.write_str("latest"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelVersion {
    pub level: Level,
    pub version: Version,
}

impl LevelVersion {
    /// Parse a profile name and version, failing on the first bad value.
    pub fn parse(level: &str, version: &str) -> Result<Self, KubesecError> {
        Ok(Self {
            level: level.parse()?,
            version: version.parse()?,
        })
    }
}

impl fmt::Display for LevelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.level, self.version)
    }
}
