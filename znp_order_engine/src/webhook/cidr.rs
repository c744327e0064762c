use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid CIDR block '{0}'")]
pub struct CidrParseError(String);

/// An IPv4 or IPv6 network, e.g. `10.0.0.0/8` or `2001:db8::/32`. A bare address is treated as a single-host block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrBlock {
    network: IpAddr,
    prefix: u8,
}

impl CidrBlock {
    pub fn new(network: IpAddr, prefix: u8) -> Result<Self, CidrParseError> {
        let max = max_prefix(&network);
        if prefix > max {
            return Err(CidrParseError(format!("{network}/{prefix}")));
        }
        Ok(Self { network: mask(network, prefix), prefix })
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        let ip = match (self.network, ip) {
            // IPv4-mapped IPv6 addresses (::ffff:a.b.c.d) match IPv4 blocks
            (IpAddr::V4(_), IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => return false,
            },
            (_, ip) => *ip,
        };
        if self.network.is_ipv4() != ip.is_ipv4() {
            return false;
        }
        mask(ip, self.prefix) == self.network
    }
}

fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask(ip: IpAddr, prefix: u8) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - u32::from(prefix)) };
            IpAddr::V4(Ipv4Addr::from(bits & mask))
        },
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - u32::from(prefix)) };
            IpAddr::V6(Ipv6Addr::from(bits & mask))
        },
    }
}

impl FromStr for CidrBlock {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || CidrParseError(s.to_string());
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let network = IpAddr::from_str(addr).map_err(|_| err())?;
                let prefix = prefix.parse::<u8>().map_err(|_| err())?;
                Self::new(network, prefix).map_err(|_| err())
            },
            None => {
                let network = IpAddr::from_str(s).map_err(|_| err())?;
                Self::new(network, max_prefix(&network))
            },
        }
    }
}

impl Display for CidrBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}
