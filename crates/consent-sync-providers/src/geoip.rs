// crates/consent-sync-providers/src/geoip.rs
// ============================================================================
// Module: IP Geolocation Table
// Description: CIDR to region lookup loaded from a CSV file.
// Purpose: Provide the region fallback used when the storefront sends none.
// Dependencies: consent-sync-core, thiserror
// ============================================================================

//! ## Overview
//! The table is a CSV of `network,region_code` rows (`192.0.2.0/24,DE`),
//! with an optional header line and `#` comments. Lookups pick the longest
//! matching prefix. Private, loopback, link-local, multicast and unspecified
//! addresses always resolve to unknown, whatever the table says. An empty
//! table answers unknown for every address, which is how a missing database
//! degrades.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use std::path::Path;

use consent_sync_core::RegionCode;
use consent_sync_core::RegionLocator;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum database size in bytes.
const MAX_GEOIP_BYTES: u64 = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Geolocation table errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeoIpError {
    /// File could not be read.
    #[error("geoip io error: {0}")]
    Io(String),
    /// A row could not be parsed.
    #[error("geoip parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Parse failure.
        message: String,
    },
    /// File exceeds the size limit.
    #[error("geoip database exceeds size limit")]
    TooLarge,
}

/// One network range.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Range<T> {
    /// Network address with host bits cleared.
    network: T,
    /// Prefix length.
    prefix: u8,
    /// Region for the range.
    region: RegionCode,
}

/// Longest-prefix CIDR table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoIpTable {
    /// IPv4 ranges, longest prefix first.
    v4: Vec<Range<u32>>,
    /// IPv6 ranges, longest prefix first.
    v6: Vec<Range<u128>>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl GeoIpTable {
    /// Returns a table that resolves nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads a table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`GeoIpError`] when the file is unreadable, too large, or has
    /// a malformed row.
    pub fn load(path: &Path) -> Result<Self, GeoIpError> {
        let metadata = fs::metadata(path).map_err(|err| GeoIpError::Io(err.to_string()))?;
        if metadata.len() > MAX_GEOIP_BYTES {
            return Err(GeoIpError::TooLarge);
        }
        let text = fs::read_to_string(path).map_err(|err| GeoIpError::Io(err.to_string()))?;
        Self::parse(&text)
    }

    /// Parses CSV text.
    ///
    /// # Errors
    ///
    /// Returns [`GeoIpError::Parse`] for the first malformed row.
    pub fn parse(text: &str) -> Result<Self, GeoIpError> {
        let mut table = Self::default();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if index == 0 && line.to_ascii_lowercase().starts_with("network") {
                continue;
            }
            let parse_error = |message: String| GeoIpError::Parse {
                line: index + 1,
                message,
            };
            let Some((network, region)) = line.split_once(',') else {
                return Err(parse_error("expected network,region_code".to_string()));
            };
            let region = RegionCode::parse(region.trim().trim_matches('"'))
                .ok_or_else(|| parse_error(format!("bad region code {region}")))?;
            table.insert(network.trim().trim_matches('"'), region).map_err(parse_error)?;
        }
        table.v4.sort_by(|a, b| b.prefix.cmp(&a.prefix));
        table.v6.sort_by(|a, b| b.prefix.cmp(&a.prefix));
        Ok(table)
    }

    /// Returns the number of ranges loaded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    /// Returns true when no ranges are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    /// Adds one CIDR range.
    fn insert(&mut self, cidr: &str, region: RegionCode) -> Result<(), String> {
        let (address, prefix) = match cidr.split_once('/') {
            Some((address, prefix)) => {
                let prefix: u8 = prefix.parse().map_err(|_| format!("bad prefix in {cidr}"))?;
                (address, Some(prefix))
            }
            None => (cidr, None),
        };
        let address: IpAddr = address.parse().map_err(|_| format!("bad address in {cidr}"))?;
        match address {
            IpAddr::V4(v4) => {
                let prefix = prefix.unwrap_or(32);
                if prefix > 32 {
                    return Err(format!("prefix too long in {cidr}"));
                }
                self.v4.push(Range {
                    network: u32::from(v4) & mask_v4(prefix),
                    prefix,
                    region,
                });
            }
            IpAddr::V6(v6) => {
                let prefix = prefix.unwrap_or(128);
                if prefix > 128 {
                    return Err(format!("prefix too long in {cidr}"));
                }
                self.v6.push(Range {
                    network: u128::from(v6) & mask_v6(prefix),
                    prefix,
                    region,
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Lookup
// ============================================================================

impl RegionLocator for GeoIpTable {
    fn locate(&self, ip: IpAddr) -> Option<RegionCode> {
        if is_non_public(&ip) {
            return None;
        }
        match ip {
            IpAddr::V4(v4) => lookup_v4(&self.v4, v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(mapped) => lookup_v4(&self.v4, mapped),
                None => {
                    let bits = u128::from(v6);
                    self.v6
                        .iter()
                        .find(|range| bits & mask_v6(range.prefix) == range.network)
                        .map(|range| range.region.clone())
                }
            },
        }
    }
}

/// Finds the longest IPv4 match.
fn lookup_v4(ranges: &[Range<u32>], ip: Ipv4Addr) -> Option<RegionCode> {
    let bits = u32::from(ip);
    ranges
        .iter()
        .find(|range| bits & mask_v4(range.prefix) == range.network)
        .map(|range| range.region.clone())
}

/// Returns the IPv4 netmask for a prefix length.
fn mask_v4(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

/// Returns the IPv6 netmask for a prefix length.
fn mask_v6(prefix: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0)
}

/// Returns true when an address can never carry a meaningful location.
#[must_use]
pub fn is_non_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => is_non_public_v4(*addr),
        IpAddr::V6(addr) => {
            if let Some(mapped) = addr.to_ipv4_mapped() {
                return is_non_public_v4(mapped);
            }
            is_non_public_v6(addr)
        }
    }
}

/// IPv4 private, loopback, link-local and similar ranges.
const fn is_non_public_v4(addr: Ipv4Addr) -> bool {
    addr.is_private()
        || addr.is_loopback()
        || addr.is_link_local()
        || addr.is_unspecified()
        || addr.is_multicast()
        || addr.is_broadcast()
}

/// IPv6 loopback, unique-local, link-local and similar ranges.
const fn is_non_public_v6(addr: &Ipv6Addr) -> bool {
    addr.is_loopback()
        || addr.is_unique_local()
        || addr.is_unicast_link_local()
        || addr.is_unspecified()
        || addr.is_multicast()
}
