use anyhow::{Context, anyhow, bail};
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An interface address in CIDR notation (e.g. `10.0.0.100/24`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Cidr {
    pub address: Ipv4Addr,
    pub prefix: u8,
}

impl Ipv4Cidr {
    /// The subnet this address lives in
    pub fn network(&self) -> Ipv4Net {
        let mask = prefix_mask(self.prefix);
        Ipv4Net {
            base: Ipv4Addr::from_bits(self.address.to_bits() & mask),
            prefix: self.prefix,
        }
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = parse_cidr(s)?;
        if prefix == 0 {
            bail!("network prefix cannot be 0 for an interface address");
        }

        Ok(Self { address, prefix })
    }
}

/// An IPv4 subnet, used as a route destination selector
///
/// `0.0.0.0/0` is the default route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Net {
    base: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Net {
    pub const DEFAULT: Ipv4Net = Ipv4Net {
        base: Ipv4Addr::UNSPECIFIED,
        prefix: 0,
    };

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// The subnet mask in dotted form (e.g. `255.255.255.0` for a /24)
    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(prefix_mask(self.prefix))
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        address.to_bits() & prefix_mask(self.prefix) == self.base.to_bits()
    }

    pub fn overlaps(&self, other: &Ipv4Net) -> bool {
        let shared = self.prefix.min(other.prefix);
        let mask = prefix_mask(shared);
        self.base.to_bits() & mask == other.base.to_bits() & mask
    }
}

impl Display for Ipv4Net {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

impl Serialize for Ipv4Net {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for Ipv4Net {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = parse_cidr(s)?;
        let base = Ipv4Addr::from_bits(address.to_bits() & prefix_mask(prefix));
        Ok(Self { base, prefix })
    }
}

fn prefix_mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        _ => u32::MAX << (32 - prefix as u32),
    }
}

// Parse CIDR syntax (e.g. 10.0.0.0/24). A missing network prefix is
// interpreted as /32.
fn parse_cidr(s: &str) -> anyhow::Result<(Ipv4Addr, u8)> {
    let mut parts = s.split('/');
    let address: Ipv4Addr = parts
        .next()
        .ok_or(anyhow!("empty string"))?
        .parse()
        .context("invalid IPv4 address in CIDR")?;

    let prefix: u8 = parts
        .next()
        .unwrap_or("32")
        .parse()
        .context("the provided network prefix is not a valid unsigned integer")?;
    if prefix > 32 {
        bail!("network prefix cannot be higher than 32");
    }

    if parts.next().is_some() {
        bail!("CIDR contains trailing characters");
    }

    Ok((address, prefix))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cidr_network() {
        let cases = [
            ("10.0.0.100/24", "10.0.0.0/24"),
            ("10.0.3.1/24", "10.0.3.0/24"),
            ("10.1.2.3/8", "10.0.0.0/8"),
            ("192.168.1.1", "192.168.1.1/32"),
        ];

        for (input, network) in cases {
            let cidr = Ipv4Cidr::from_str(input).unwrap();
            assert_eq!(cidr.network().to_string(), network);
        }
    }

    #[test]
    fn test_net_contains() {
        let net = Ipv4Net::from_str("10.0.2.0/24").unwrap();
        assert!(net.contains("10.0.2.100".parse().unwrap()));
        assert!(net.contains("10.0.2.1".parse().unwrap()));
        assert!(!net.contains("10.0.3.100".parse().unwrap()));

        assert!(Ipv4Net::DEFAULT.contains("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_net_mask() {
        let cases = [("10.0.2.0/24", "255.255.255.0"), ("10.0.0.0/8", "255.0.0.0")];
        for (net, mask) in cases {
            let net = Ipv4Net::from_str(net).unwrap();
            assert_eq!(net.mask().to_string(), mask);
        }
        assert_eq!(Ipv4Net::DEFAULT.mask(), Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn test_net_overlap() {
        let a = Ipv4Net::from_str("10.0.0.0/24").unwrap();
        let b = Ipv4Net::from_str("10.0.1.0/24").unwrap();
        let wide = Ipv4Net::from_str("10.0.0.0/16").unwrap();

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&wide));
        assert!(wide.overlaps(&b));
        assert!(a.overlaps(&a));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Ipv4Cidr::from_str("10.0.0.1/0").is_err());
        assert!(Ipv4Cidr::from_str("10.0.0.1/33").is_err());
        assert!(Ipv4Cidr::from_str("10.0.0.1/24/7").is_err());
        assert!(Ipv4Cidr::from_str("not-an-ip/24").is_err());
        assert!(Ipv4Net::from_str("0.0.0.0/0").is_ok());
    }
}
