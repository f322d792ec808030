use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SchemaError;

/// `major.minor` document version. A newer minor only adds optional fields;
/// a newer major cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion { major: 1, minor: 0 };

    pub const fn new(major: u32, minor: u32) -> Self { Self { major, minor } }

    pub fn is_readable(&self) -> bool { self.major <= Self::CURRENT.major }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}.{}", self.major, self.minor) }
}

impl FromStr for SchemaVersion {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || SchemaError::BadVersion(s.to_string());
        let (major, minor) = s.trim().split_once('.').unwrap_or((s.trim(), "0"));
        Ok(Self { major: major.parse().map_err(|_| bad())?, minor: minor.parse().map_err(|_| bad())? })
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> { serializer.collect_str(self) }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_major_minor() {
        assert_eq!("1.4".parse::<SchemaVersion>().unwrap(), SchemaVersion::new(1, 4));
        assert_eq!("2".parse::<SchemaVersion>().unwrap(), SchemaVersion::new(2, 0));
        assert!("one.two".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn ordering_and_readability() {
        assert!(SchemaVersion::new(1, 9).is_readable());
        assert!(!SchemaVersion::new(2, 0).is_readable());
        assert!(SchemaVersion::new(0, 3) < SchemaVersion::CURRENT);
    }
}
