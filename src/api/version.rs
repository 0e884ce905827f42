//! Purpose: Parse and negotiate the `X-Broker-API-Version` header.
//! Exports: `ProtocolVersion`, `MinVersion`, `negotiate`, `VERSION_HEADER`, `SUPPORTED_MAJOR`.
//! Role: First pipeline stage; every request must name a supported version.
//! Invariants: `negotiate` is pure; all of its failures are `UnsupportedVersion`.
//! Invariants: `MinVersion` reads are lock-free and a store is a single atomic swap.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::core::error::{Error, ErrorKind};

pub const VERSION_HEADER: &str = "X-Broker-API-Version";
pub const SUPPORTED_MAJOR: u32 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
}

impl ProtocolVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    const fn pack(self) -> u64 {
        ((self.major as u64) << 32) | self.minor as u64
    }

    const fn unpack(packed: u64) -> Self {
        Self::new((packed >> 32) as u32, packed as u32)
    }
}

impl Ord for ProtocolVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl PartialOrd for ProtocolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            Error::new(ErrorKind::UnsupportedVersion)
                .with_message(format!("{VERSION_HEADER} header is invalid"))
        };
        let (major, minor) = value.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self::new(
            parse_component(major).ok_or_else(invalid)?,
            parse_component(minor).ok_or_else(invalid)?,
        ))
    }
}

fn parse_component(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Checks a request's version header against `minimum`.
pub fn negotiate(header: Option<&str>, minimum: ProtocolVersion) -> Result<ProtocolVersion, Error> {
    let Some(header) = header else {
        return Err(Error::new(ErrorKind::UnsupportedVersion)
            .with_message(format!("{VERSION_HEADER} header is missing")));
    };
    let version: ProtocolVersion = header.parse()?;
    if version.major != SUPPORTED_MAJOR {
        return Err(Error::new(ErrorKind::UnsupportedVersion).with_message(format!(
            "This broker only supports API version {SUPPORTED_MAJOR}.x"
        )));
    }
    if version < minimum {
        return Err(Error::new(ErrorKind::UnsupportedVersion).with_message(format!(
            "This broker requires API version {minimum} or later"
        )));
    }
    Ok(version)
}

/// Minimum accepted version, swappable at runtime without locks.
#[derive(Debug)]
pub struct MinVersion(AtomicU64);

impl MinVersion {
    pub const DEFAULT: ProtocolVersion = ProtocolVersion::new(2, 4);

    pub fn new(version: ProtocolVersion) -> Self {
        Self(AtomicU64::new(version.pack()))
    }

    pub fn get(&self) -> ProtocolVersion {
        ProtocolVersion::unpack(self.0.load(AtomicOrdering::Acquire))
    }

    pub fn set(&self, version: ProtocolVersion) {
        self.0.store(version.pack(), AtomicOrdering::Release);
    }
}

impl Default for MinVersion {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}
