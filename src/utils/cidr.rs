/// CIDR parsing and address derivation for network templates
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::render::ManifestError;

/// A parsed network block such as `10.0.0.0/16`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Total bits in the address family
    fn width(&self) -> u8 {
        match self.network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    fn mask_bits(&self) -> u128 {
        let width = self.width();
        if self.prefix == 0 {
            return 0;
        }
        let all = if width == 128 {
            u128::MAX
        } else {
            (1u128 << width) - 1
        };
        all & !((1u128 << (width - self.prefix)) - 1)
    }

    fn base_bits(&self) -> u128 {
        let raw = match self.network {
            IpAddr::V4(ip) => u32::from(ip) as u128,
            IpAddr::V6(ip) => u128::from(ip),
        };
        raw & self.mask_bits()
    }

    fn from_bits(&self, bits: u128) -> IpAddr {
        match self.network {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(bits as u32)),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(bits)),
        }
    }

    /// Host address at `offset` from the start of the block.
    ///
    /// Offset 0 is the network address itself; offsets past the end of the
    /// block are rejected.
    pub fn address(&self, offset: u64) -> Result<IpAddr, ManifestError> {
        let host_bits = self.width() - self.prefix;
        let offset = offset as u128;
        if host_bits < 128 && offset >= (1u128 << host_bits) {
            return Err(ManifestError::InvalidCidr {
                cidr: self.to_string(),
                reason: format!("offset {} is outside the network", offset),
            });
        }
        Ok(self.from_bits(self.base_bits() + offset))
    }

    /// Network mask in address notation, e.g. `255.255.0.0`
    pub fn mask(&self) -> IpAddr {
        self.from_bits(self.mask_bits())
    }
}

impl FromStr for Cidr {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ManifestError::InvalidCidr {
            cidr: s.to_string(),
            reason: reason.to_string(),
        };

        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("missing prefix length"))?;
        let network: IpAddr = addr.parse().map_err(|_| invalid("malformed address"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| invalid("malformed prefix length"))?;

        let cidr = Cidr { network, prefix };
        if prefix > cidr.width() {
            return Err(invalid("prefix length exceeds address width"));
        }
        Ok(cidr)
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.from_bits(self.base_bits()), self.prefix)
    }
}
