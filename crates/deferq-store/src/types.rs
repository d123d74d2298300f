//! Value types shared by store implementations.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Execution-time score: milliseconds since the Unix epoch.
pub type Score = i64;

/// The current wall-clock time as a score.
pub fn now_ms() -> Score {
    chrono::Utc::now().timestamp_millis()
}

/// A backing store's reported version triple.
///
/// Ordering is lexicographic: a greater major always wins, equal majors
/// compare minors, equal minors compare patches. The derived `Ord` on the
/// field order gives exactly that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a dotted version string such as `"7.2.4"`.
    ///
    /// Missing minor/patch components default to zero; anything
    /// non-numeric yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().splitn(3, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Identity of one established store connection.
///
/// Two handles over the same underlying connection report the same id;
/// separate connections to the same server report different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
