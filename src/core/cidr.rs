//! IPv4/IPv6 address blocks
//!
//! A [`CidrBlock`] is a network address plus a prefix length. The address is
//! always stored in canonical form: every bit past the prefix is zero, so a
//! block built from any address inside a range is equal to the block built
//! from that range's network address.
//!
//! Both families share one representation. IPv4 addresses live in the low 32
//! bits of a `u128`, which keeps the mask arithmetic identical for the two
//! families; only the width differs.
//!
//! # Example
//!
//! ```
//! use vpnfw::core::cidr::CidrBlock;
//!
//! let block: CidrBlock = "10.42.43.12/23".parse().unwrap();
//! assert_eq!(block.to_string(), "10.42.42.0/23");
//!
//! let halves = block.split(2).unwrap();
//! assert_eq!(halves[0].to_string(), "10.42.42.0/24");
//! assert_eq!(halves[1].to_string(), "10.42.43.0/24");
//! ```

use crate::core::error::{CidrError, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// IP address family
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum Family {
    #[strum(serialize = "IPv4")]
    V4,
    #[strum(serialize = "IPv6")]
    V6,
}

impl Family {
    /// Address width in bits
    pub const fn width(self) -> u8 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }

    /// The conventional family number (4 or 6)
    pub const fn number(self) -> u8 {
        match self {
            Family::V4 => 4,
            Family::V6 => 6,
        }
    }

    /// All address bits of this family set
    const fn full_mask(self) -> u128 {
        match self {
            Family::V4 => u32::MAX as u128,
            Family::V6 => u128::MAX,
        }
    }
}

impl TryFrom<u8> for Family {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(Family::V4),
            6 => Ok(Family::V6),
            other => Err(Error::UnsupportedFamily(other)),
        }
    }
}

/// An immutable, canonicalized address block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrBlock {
    family: Family,
    network: u128,
    prefix: u8,
}

/// Prefix of every IPv6 sub-block handed out by [`CidrBlock::split`]
pub const IPV6_SUBNET_PREFIX: u8 = 64;

/// Mask with the leading `prefix` bits of the family's width set.
fn prefix_mask(family: Family, prefix: u8) -> u128 {
    let host_bits = u32::from(family.width() - prefix);
    let host_mask = 1u128.checked_shl(host_bits).map_or(u128::MAX, |size| size - 1);
    family.full_mask() & !host_mask
}

impl CidrBlock {
    /// Builds a block from any address inside it.
    ///
    /// # Errors
    ///
    /// Returns [`CidrError::InvalidPrefix`] if `prefix` exceeds the family width.
    pub fn new(address: IpAddr, prefix: u8) -> Result<Self, CidrError> {
        let (family, bits) = match address {
            IpAddr::V4(v4) => (Family::V4, u128::from(u32::from(v4))),
            IpAddr::V6(v6) => (Family::V6, u128::from(v6)),
        };
        Self::from_bits(family, bits, prefix)
    }

    fn from_bits(family: Family, bits: u128, prefix: u8) -> Result<Self, CidrError> {
        if prefix > family.width() {
            return Err(CidrError::InvalidPrefix {
                input: prefix.to_string(),
                max: family.width(),
            });
        }
        Ok(Self {
            family,
            network: bits & prefix_mask(family, prefix),
            prefix,
        })
    }

    pub const fn family(&self) -> Family {
        self.family
    }

    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    /// The canonical network address
    pub fn network(&self) -> IpAddr {
        match self.family {
            // Only the low 32 bits are ever set for IPv4
            #[allow(clippy::cast_possible_truncation)]
            Family::V4 => IpAddr::V4(Ipv4Addr::from(self.network as u32)),
            Family::V6 => IpAddr::V6(Ipv6Addr::from(self.network)),
        }
    }

    /// Dotted-quad netmask. IPv6 has no dotted-quad netmask, so it returns `None`.
    pub fn netmask(&self) -> Option<Ipv4Addr> {
        match self.family {
            #[allow(clippy::cast_possible_truncation)]
            Family::V4 => Some(Ipv4Addr::from(
                prefix_mask(Family::V4, self.prefix) as u32,
            )),
            Family::V6 => None,
        }
    }

    /// Usable host addresses: the block size minus network and broadcast.
    ///
    /// Floored at zero for /31 and /32. Only defined for IPv4.
    pub fn number_of_hosts(&self) -> Option<u64> {
        match self.family {
            Family::V4 => {
                let size = 1u64 << (32 - u32::from(self.prefix));
                Some(size.saturating_sub(2))
            }
            Family::V6 => None,
        }
    }

    /// Whether `address` falls inside this block
    pub fn contains(&self, address: IpAddr) -> bool {
        match Self::new(address, self.prefix) {
            Ok(other) => other == *self,
            Err(_) => false,
        }
    }

    /// Splits the block into `count` contiguous sub-blocks in ascending order,
    /// starting at the network address.
    ///
    /// IPv4 sub-blocks tile the original block exactly. IPv6 sub-blocks are
    /// always /64, counted up from the network address; the rest of the block
    /// stays unassigned. `split(1)` returns the block itself for both families.
    ///
    /// # Errors
    ///
    /// - [`CidrError::InvalidSplitCount`] if `count` is not a positive power of two
    /// - [`CidrError::PrefixOverflow`] if the sub-blocks do not fit: the new IPv4
    ///   prefix would exceed 32, or `count` /64s exceed the IPv6 block
    pub fn split(&self, count: usize) -> Result<Vec<CidrBlock>, CidrError> {
        if !count.is_power_of_two() {
            return Err(CidrError::InvalidSplitCount(count));
        }
        if count == 1 {
            return Ok(vec![*self]);
        }

        let limit = match self.family {
            Family::V4 => Family::V4.width(),
            Family::V6 => IPV6_SUBNET_PREFIX,
        };
        let needed = u32::from(self.prefix) + count.trailing_zeros();
        if needed > u32::from(limit) {
            return Err(CidrError::PrefixOverflow {
                prefix: self.prefix,
                count,
                width: limit,
            });
        }

        let new_prefix = match self.family {
            // needed <= 32 was checked above
            #[allow(clippy::cast_possible_truncation)]
            Family::V4 => needed as u8,
            Family::V6 => IPV6_SUBNET_PREFIX,
        };
        // new_prefix >= 1 here, so the shift is at most 127
        let size = 1u128 << (u32::from(self.family.width()) - u32::from(new_prefix));

        Ok((0..count as u128)
            .map(|i| CidrBlock {
                family: self.family,
                network: self.network + i * size,
                prefix: new_prefix,
            })
            .collect())
    }
}

/// Accepts `address` or `address/prefix`.
impl FromStr for CidrBlock {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let address = parts.next().unwrap_or_default();
        let prefix = parts.next();
        if parts.next().is_some() {
            return Err(CidrError::InvalidFormat(s.to_string()));
        }

        let (family, bits) = if address.contains(':') {
            let v6 = Ipv6Addr::from_str(address)
                .map_err(|_| CidrError::InvalidAddress(address.to_string()))?;
            (Family::V6, u128::from(v6))
        } else {
            let v4 = Ipv4Addr::from_str(address)
                .map_err(|_| CidrError::InvalidAddress(address.to_string()))?;
            (Family::V4, u128::from(u32::from(v4)))
        };

        let prefix = match prefix {
            None => family.width(),
            Some(text) => parse_prefix(text, family)?,
        };

        Self::from_bits(family, bits, prefix)
    }
}

fn parse_prefix(text: &str, family: Family) -> Result<u8, CidrError> {
    let invalid = || CidrError::InvalidPrefix {
        input: text.to_string(),
        max: family.width(),
    };

    // u8::from_str would also take a leading '+'
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let prefix: u8 = text.parse().map_err(|_| invalid())?;
    if prefix > family.width() {
        return Err(invalid());
    }
    Ok(prefix)
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

impl TryFrom<String> for CidrBlock {
    type Error = CidrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CidrBlock> for String {
    fn from(block: CidrBlock) -> Self {
        block.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(s: &str) -> CidrBlock {
        s.parse().unwrap()
    }

    fn split_strings(s: &str, n: usize) -> Vec<String> {
        block(s)
            .split(n)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_netmask_table() {
        let cases = [
            ("10.42.42.0/24", "255.255.255.0"),
            ("10.42.42.0/25", "255.255.255.128"),
            ("10.42.42.0/23", "255.255.254.0"),
            ("10.42.42.42/32", "255.255.255.255"),
            ("0.0.0.0/0", "0.0.0.0"),
        ];
        for (input, mask) in cases {
            assert_eq!(block(input).netmask().unwrap().to_string(), mask, "{input}");
        }
    }

    #[test]
    fn test_network_address() {
        assert_eq!(block("10.42.42.0/24").network().to_string(), "10.42.42.0");
        assert_eq!(block("10.42.42.42/32").network().to_string(), "10.42.42.42");
    }

    #[test]
    fn test_non_network_start_rounds_down() {
        let b = block("10.42.43.12/23");
        assert_eq!(b.to_string(), "10.42.42.0/23");
        assert_eq!(b.netmask().unwrap().to_string(), "255.255.254.0");
        assert_eq!(b, block("10.42.42.0/23"));
    }

    #[test]
    fn test_missing_prefix_is_host_route() {
        assert_eq!(block("10.42.42.0").to_string(), "10.42.42.0/32");
        assert_eq!(block("fd00::1").to_string(), "fd00::1/128");
    }

    #[test]
    fn test_ipv6_canonical_text() {
        assert_eq!(block("fd00::0/60").to_string(), "fd00::/60");
        assert_eq!(block("fd00::1/60").to_string(), "fd00::/60");
    }

    #[test]
    fn test_round_trip_canonical() {
        for s in [
            "10.42.42.0/24",
            "0.0.0.0/0",
            "255.255.255.255/32",
            "fd00:4242:4242:4240::/60",
            "::/0",
            "2001:db8::1/128",
        ] {
            assert_eq!(block(s).to_string(), s);
        }
    }

    #[test]
    fn test_number_of_hosts() {
        assert_eq!(block("10.42.42.0/24").number_of_hosts(), Some(254));
        assert_eq!(block("10.42.42.0/25").number_of_hosts(), Some(126));
        assert_eq!(block("10.42.42.0/30").number_of_hosts(), Some(2));
        assert_eq!(block("10.42.42.0/31").number_of_hosts(), Some(0));
        assert_eq!(block("10.42.42.0/32").number_of_hosts(), Some(0));
        assert_eq!(block("0.0.0.0/0").number_of_hosts(), Some(4_294_967_294));
    }

    #[test]
    fn test_ipv6_has_no_netmask_or_host_count() {
        let b = block("fd00::/64");
        assert_eq!(b.netmask(), None);
        assert_eq!(b.number_of_hosts(), None);
    }

    #[test]
    fn test_invalid_address() {
        assert_eq!(
            "10.42.42.260/24".parse::<CidrBlock>(),
            Err(CidrError::InvalidAddress("10.42.42.260".into()))
        );
        assert!(matches!(
            "10.42.42/24".parse::<CidrBlock>(),
            Err(CidrError::InvalidAddress(_))
        ));
        assert!(matches!(
            "fd00:::1/64".parse::<CidrBlock>(),
            Err(CidrError::InvalidAddress(_))
        ));
        assert!(matches!(
            "".parse::<CidrBlock>(),
            Err(CidrError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_invalid_prefix() {
        assert_eq!(
            "10.42.42.0/40".parse::<CidrBlock>(),
            Err(CidrError::InvalidPrefix {
                input: "40".into(),
                max: 32
            })
        );
        for bad in ["10.42.42.0/", "10.42.42.0/abc", "10.42.42.0/+8", "10.42.42.0/-1", "10.42.42.0/999"] {
            assert!(
                matches!(bad.parse::<CidrBlock>(), Err(CidrError::InvalidPrefix { .. })),
                "{bad}"
            );
        }
        assert!("fd00::/128".parse::<CidrBlock>().is_ok());
        assert!(matches!(
            "fd00::/129".parse::<CidrBlock>(),
            Err(CidrError::InvalidPrefix { max: 128, .. })
        ));
    }

    #[test]
    fn test_invalid_format() {
        assert_eq!(
            "10.42.42.0//24".parse::<CidrBlock>(),
            Err(CidrError::InvalidFormat("10.42.42.0//24".into()))
        );
        assert!(matches!(
            "10.42.42.0/24/8".parse::<CidrBlock>(),
            Err(CidrError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_split_range() {
        assert_eq!(split_strings("10.42.42.0/24", 1), ["10.42.42.0/24"]);
        assert_eq!(
            split_strings("10.42.42.0/24", 2),
            ["10.42.42.0/25", "10.42.42.128/25"]
        );
        assert_eq!(
            split_strings("10.42.42.0/27", 2),
            ["10.42.42.0/28", "10.42.42.16/28"]
        );
        assert_eq!(
            split_strings("10.42.42.0/24", 4),
            [
                "10.42.42.0/26",
                "10.42.42.64/26",
                "10.42.42.128/26",
                "10.42.42.192/26"
            ]
        );
        assert_eq!(
            split_strings("10.42.42.0/25", 2),
            ["10.42.42.0/26", "10.42.42.64/26"]
        );
        assert_eq!(
            split_strings("10.42.42.0/26", 4),
            [
                "10.42.42.0/28",
                "10.42.42.16/28",
                "10.42.42.32/28",
                "10.42.42.48/28"
            ]
        );
    }

    #[test]
    fn test_split_ipv6() {
        assert_eq!(
            split_strings("fd00:4242:4242:4242::/60", 2),
            ["fd00:4242:4242:4240::/64", "fd00:4242:4242:4241::/64"]
        );
        assert_eq!(
            split_strings("fd00:4242:4242:42ff::/60", 2),
            ["fd00:4242:4242:42f0::/64", "fd00:4242:4242:42f1::/64"]
        );
    }

    #[test]
    fn test_split_ipv6_hands_out_64s() {
        assert_eq!(
            split_strings("fd00:4242:4242::/48", 4),
            [
                "fd00:4242:4242::/64",
                "fd00:4242:4242:1::/64",
                "fd00:4242:4242:2::/64",
                "fd00:4242:4242:3::/64"
            ]
        );
        assert_eq!(
            split_strings("fd00:4242:4242:4240::/63", 2),
            ["fd00:4242:4242:4240::/64", "fd00:4242:4242:4241::/64"]
        );
        assert_eq!(split_strings("fd00::/60", 1), ["fd00::/60"]);
    }

    #[test]
    fn test_split_whole_space() {
        assert_eq!(split_strings("0.0.0.0/0", 2), ["0.0.0.0/1", "128.0.0.0/1"]);
        assert_eq!(split_strings("::/0", 2), ["::/64", "0:0:0:1::/64"]);
        assert_eq!(split_strings("::/0", 1), ["::/0"]);
    }

    #[test]
    fn test_split_invalid_count() {
        let b = block("10.42.42.0/24");
        assert_eq!(b.split(0), Err(CidrError::InvalidSplitCount(0)));
        assert_eq!(b.split(3), Err(CidrError::InvalidSplitCount(3)));
        assert_eq!(b.split(6), Err(CidrError::InvalidSplitCount(6)));
    }

    #[test]
    fn test_split_prefix_overflow() {
        assert_eq!(
            block("10.42.42.0/31").split(4),
            Err(CidrError::PrefixOverflow {
                prefix: 31,
                count: 4,
                width: 32
            })
        );
        assert!(block("10.42.42.0/31").split(2).is_ok());
        assert_eq!(
            block("fd00::/64").split(2),
            Err(CidrError::PrefixOverflow {
                prefix: 64,
                count: 2,
                width: 64
            })
        );
        assert!(matches!(
            block("fd00::/60").split(32),
            Err(CidrError::PrefixOverflow { width: 64, .. })
        ));
        assert!(block("fd00::/60").split(16).is_ok());
        assert!(block("fd00::/127").split(1).is_ok());
    }

    #[test]
    fn test_contains() {
        let b = block("10.42.42.0/24");
        assert!(b.contains("10.42.42.200".parse().unwrap()));
        assert!(!b.contains("10.42.43.1".parse().unwrap()));
        assert!(!b.contains("fd00::1".parse().unwrap()));
    }

    #[test]
    fn test_new_canonicalizes() {
        let from_host = CidrBlock::new("10.42.43.12".parse().unwrap(), 23).unwrap();
        assert_eq!(from_host, block("10.42.42.0/23"));
        assert!(matches!(
            CidrBlock::new("10.0.0.0".parse().unwrap(), 33),
            Err(CidrError::InvalidPrefix { max: 32, .. })
        ));
    }

    #[test]
    fn test_family_from_number() {
        assert_eq!(Family::try_from(4).unwrap(), Family::V4);
        assert_eq!(Family::try_from(6).unwrap(), Family::V6);
        assert!(matches!(Family::try_from(5), Err(Error::UnsupportedFamily(5))));
    }

    #[test]
    fn test_serde_uses_text_form() {
        let b: CidrBlock = serde_json::from_str("\"10.42.43.12/23\"").unwrap();
        assert_eq!(serde_json::to_string(&b).unwrap(), "\"10.42.42.0/23\"");
        assert!(serde_json::from_str::<CidrBlock>("\"10.42.42.0//24\"").is_err());
    }
}
