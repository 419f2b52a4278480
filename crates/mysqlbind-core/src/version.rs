//! Client library version numbers.
//!
//! Versions use the `MYSQL_VERSION_ID` encoding returned by
//! `mysql_get_client_version()` and `mysql_get_server_version()`:
//! `major * 10000 + minor * 100 + patch`, so 8.0.36 is `80036`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A numeric MySQL version in `MYSQL_VERSION_ID` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryVersion(u32);

impl LibraryVersion {
    /// First client library version whose bind descriptors use a native
    /// `bool` for the null and error flags instead of `my_bool`.
    pub const BOOL_CUTOVER: LibraryVersion = LibraryVersion(80000);

    /// Wrap a raw `MYSQL_VERSION_ID` value.
    pub const fn from_id(id: u32) -> Self {
        Self(id)
    }

    /// Build from components.
    ///
    /// # Panics
    /// If `minor` or `patch` exceed 99, or the encoded id overflows `u32`.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        match Self::checked_new(major, minor, patch) {
            Some(version) => version,
            None => panic!("version components out of range"),
        }
    }

    /// Build from components, or `None` when they do not fit the encoding.
    pub const fn checked_new(major: u32, minor: u32, patch: u32) -> Option<Self> {
        if minor > 99 || patch > 99 {
            return None;
        }
        let Some(id) = major.checked_mul(10_000) else {
            return None;
        };
        // minor * 100 + patch is at most 9999
        match id.checked_add(minor * 100 + patch) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Resolve the linked library's version from its numeric id, falling
    /// back to the `mysql_get_client_info()` string when the id is zero.
    ///
    /// Some client builds report no numeric id; their version string still
    /// carries the release.
    pub fn from_client(id: u32, info: Option<&str>) -> Option<Self> {
        if id != 0 {
            return Some(Self(id));
        }
        info.and_then(|s| s.parse().ok())
    }

    /// The raw `MYSQL_VERSION_ID` value.
    pub const fn id(self) -> u32 {
        self.0
    }

    pub const fn major(self) -> u32 {
        self.0 / 10_000
    }

    pub const fn minor(self) -> u32 {
        (self.0 / 100) % 100
    }

    pub const fn patch(self) -> u32 {
        self.0 % 100
    }

    /// Whether descriptors for this version carry native `bool` flags.
    pub const fn has_native_bool(self) -> bool {
        self.0 >= Self::BOOL_CUTOVER.0
    }
}

impl fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

impl FromStr for LibraryVersion {
    type Err = ConfigError;

    /// Parse a dotted version string such as `"8.0.36"` or `"5.7.44-log"`.
    ///
    /// Anything after the patch number (distribution suffixes) is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError {
            message: format!("invalid MySQL version string: {s:?}"),
            source: None,
        };

        let mut parts = s.trim().splitn(3, '.');
        let major = parts.next().and_then(leading_number).ok_or_else(invalid)?;
        let minor = parts.next().and_then(leading_number).ok_or_else(invalid)?;
        let patch = parts.next().map_or(Some(0), leading_number).ok_or_else(invalid)?;

        Self::checked_new(major, minor, patch).ok_or_else(invalid)
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let end = part
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(part.len());
    part[..end].parse().ok()
}
