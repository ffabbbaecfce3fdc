//! Range-file `GeoIpResolver`.
//!
//! The file lists one IPv4 range per line, inclusive at both ends:
//!
//! ```text
//! # start       end             country
//! 1.0.0.0       1.0.0.255       AU
//! 8.8.8.0       8.8.8.255       US
//! ```
//!
//! Fields are separated by whitespace; extra trailing fields are ignored.
//! Blank lines and lines starting with `#` are skipped. Ranges may appear
//! in any order but must not overlap.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::str::FromStr;

use tracing::info;

use ztna_contracts::error::{ZtnaError, ZtnaResult};
use ztna_core::traits::GeoIpResolver;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CountryRange {
    start: u32,
    end: u32,
    country: String,
}

/// Country lookup over sorted IPv4 ranges.
#[derive(Debug, Clone, Default)]
pub struct RangeGeoIpResolver {
    ranges: Vec<CountryRange>,
}

impl RangeGeoIpResolver {
    /// Load a range file from disk.
    pub fn from_file(path: &Path) -> ZtnaResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ZtnaError::ConfigError {
            reason: format!("failed to read GeoIP ranges '{}': {}", path.display(), e),
        })?;
        let resolver: Self = text.parse().map_err(|e| match e {
            ZtnaError::ConfigError { reason } => ZtnaError::ConfigError {
                reason: format!("{}: {}", path.display(), reason),
            },
            other => other,
        })?;
        info!(path = %path.display(), ranges = resolver.len(), "GeoIP ranges loaded");
        Ok(resolver)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl FromStr for RangeGeoIpResolver {
    type Err = ZtnaError;

    fn from_str(text: &str) -> ZtnaResult<Self> {
        let mut ranges = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let range = parse_line(line).map_err(|reason| ZtnaError::ConfigError {
                reason: format!("GeoIP line {}: {}", idx + 1, reason),
            })?;
            ranges.push(range);
        }

        ranges.sort_by_key(|r| r.start);
        if let Some(pair) = ranges.windows(2).find(|pair| pair[1].start <= pair[0].end) {
            return Err(ZtnaError::ConfigError {
                reason: format!(
                    "GeoIP ranges starting at {} and {} overlap",
                    Ipv4Addr::from(pair[0].start),
                    Ipv4Addr::from(pair[1].start)
                ),
            });
        }
        Ok(Self { ranges })
    }
}

fn parse_line(line: &str) -> Result<CountryRange, String> {
    let mut fields = line.split_whitespace();
    let (Some(start), Some(end), Some(country)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(format!("expected '<start> <end> <country>', got '{line}'"));
    };

    let parse_ip = |s: &str| {
        s.parse::<Ipv4Addr>()
            .map(u32::from)
            .map_err(|_| format!("'{s}' is not an IPv4 address"))
    };
    let start = parse_ip(start)?;
    let end = parse_ip(end)?;
    if start > end {
        return Err(format!(
            "range start {} is after end {}",
            Ipv4Addr::from(start),
            Ipv4Addr::from(end)
        ));
    }
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("'{country}' is not a two-letter country code"));
    }

    Ok(CountryRange {
        start,
        end,
        country: country.to_ascii_uppercase(),
    })
}

impl GeoIpResolver for RangeGeoIpResolver {
    /// IPv6 addresses resolve only when they are IPv4-mapped.
    fn lookup_country(&self, ip: IpAddr) -> Option<String> {
        let v4 = match ip {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(v6) => v6.to_ipv4_mapped()?,
        };
        let value = u32::from(v4);
        let idx = self.ranges.partition_point(|r| r.end < value);
        self.ranges
            .get(idx)
            .filter(|r| r.start <= value)
            .map(|r| r.country.clone())
    }
}
