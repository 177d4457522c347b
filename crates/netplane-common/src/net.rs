//! CIDR parsing for IPAM validation
//!
//! Only what the IPAM transfer needs: parse, prefix and size arithmetic,
//! alignment checks and resource-name encoding of a block CIDR.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::Error;

/// An IPv4 or IPv6 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    addr: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Network address as written (not masked).
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length.
    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    /// Bit width of the address family (32 or 128).
    pub fn max_prefix(&self) -> u8 {
        match self.addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    /// Whether this is an IPv4 network.
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// Number of addresses in the network, saturating at `u128::MAX`.
    pub fn size(&self) -> u128 {
        let host_bits = u32::from(self.max_prefix() - self.prefix);
        1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
    }

    /// Whether the address has no host bits set.
    pub fn is_aligned(&self) -> bool {
        self.as_u128() & !self.mask() == 0
    }

    /// Whether `ip` falls inside this network.
    pub fn contains(&self, ip: IpAddr) -> bool {
        if ip.is_ipv4() != self.is_ipv4() {
            return false;
        }
        (to_u128(ip) & self.mask()) == (self.as_u128() & self.mask())
    }

    /// Whether `other` lies entirely inside this network.
    pub fn contains_cidr(&self, other: &Cidr) -> bool {
        other.prefix >= self.prefix && self.contains(other.addr)
    }

    /// Encode the CIDR as a Kubernetes object name, e.g. `10.0.0.0/26`
    /// becomes `10-0-0-0-26`.
    pub fn resource_name(&self) -> String {
        self.to_string().replace(['.', ':', '/'], "-")
    }

    fn as_u128(&self) -> u128 {
        to_u128(self.addr)
    }

    fn mask(&self) -> u128 {
        let width = u32::from(self.max_prefix());
        let host_bits = width - u32::from(self.prefix);
        let all = if width == 128 {
            u128::MAX
        } else {
            (1u128 << width) - 1
        };
        all & !(1u128.checked_shl(host_bits).map(|v| v - 1).unwrap_or(u128::MAX))
    }
}

fn to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::validation(format!("'{}' is not in CIDR notation", s)))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| Error::validation(format!("'{}' has an invalid address", s)))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| Error::validation(format!("'{}' has an invalid prefix length", s)))?;
        let cidr = Cidr { addr, prefix };
        if prefix > cidr.max_prefix() {
            return Err(Error::validation(format!(
                "'{}' prefix length exceeds {}",
                s,
                cidr.max_prefix()
            )));
        }
        Ok(cidr)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}
