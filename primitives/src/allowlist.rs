use std::{fmt, net::IpAddr, str::FromStr};

use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid IP address '{0}'")]
    InvalidIp(String),
    #[error("Invalid CIDR prefix length '{0}'")]
    InvalidPrefix(String),
    #[error("Prefix length {prefix} is too large for {network}")]
    PrefixOutOfRange { network: IpAddr, prefix: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Exact(IpAddr),
    Cidr { network: IpAddr, prefix: u8 },
}

impl Rule {
    fn matches(&self, ip: IpAddr) -> bool {
        match *self {
            Rule::Exact(exact) => exact == ip,
            Rule::Cidr { network, prefix } => match (network, ip) {
                (IpAddr::V4(network), IpAddr::V4(ip)) => {
                    prefix_match(&network.octets(), &ip.octets(), prefix)
                }
                (IpAddr::V6(network), IpAddr::V6(ip)) => {
                    prefix_match(&network.octets(), &ip.octets(), prefix)
                }
                // an IPv4 rule never matches an IPv6 client and vice versa
                _ => false,
            },
        }
    }
}

fn prefix_match(network: &[u8], ip: &[u8], prefix: u8) -> bool {
    let full_octets = usize::from(prefix / 8);
    let remainder = prefix % 8;

    if network[..full_octets] != ip[..full_octets] {
        return false;
    }

    if remainder == 0 {
        return true;
    }

    let mask = !(0xff_u8 >> remainder);
    (network[full_octets] & mask) == (ip[full_octets] & mask)
}

/// Source IP allowlist for the postback endpoint.
///
/// Parsed from a comma-separated list of exact IPs and CIDR blocks,
/// e.g. `"203.0.113.7, 10.0.0.0/8"`. An empty list allows everyone -
/// the allowlist is opt-in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpAllowlist {
    rules: Vec<Rule>,
}

impl IpAllowlist {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn allows(&self, ip: IpAddr) -> bool {
        self.rules.iter().any(|rule| rule.matches(ip))
    }
}

impl FromStr for IpAllowlist {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let rules = input
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once('/') {
                Some((network, prefix)) => {
                    let network: IpAddr = network
                        .parse()
                        .map_err(|_| ParseError::InvalidIp(network.to_string()))?;
                    let prefix: u8 = prefix
                        .parse()
                        .map_err(|_| ParseError::InvalidPrefix(prefix.to_string()))?;

                    let max_prefix = match network {
                        IpAddr::V4(_) => 32,
                        IpAddr::V6(_) => 128,
                    };
                    if prefix > max_prefix {
                        return Err(ParseError::PrefixOutOfRange { network, prefix });
                    }

                    Ok(Rule::Cidr { network, prefix })
                }
                None => entry
                    .parse()
                    .map(Rule::Exact)
                    .map_err(|_| ParseError::InvalidIp(entry.to_string())),
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { rules })
    }
}

impl fmt::Display for IpAllowlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for rule in &self.rules {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            match rule {
                Rule::Exact(ip) => write!(f, "{}", ip)?,
                Rule::Cidr { network, prefix } => write!(f, "{}/{}", network, prefix)?,
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for IpAllowlist {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;

        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_exact_ips_and_cidr_blocks() {
        let allowlist = "203.0.113.7, 10.0.0.0/8,2001:db8::/32"
            .parse::<IpAllowlist>()
            .expect("Should parse");

        assert_eq!(3, allowlist.rules.len());
        assert!(allowlist.allows("203.0.113.7".parse().unwrap()));
        assert!(allowlist.allows("10.42.0.1".parse().unwrap()));
        assert!(allowlist.allows("2001:db8::1".parse().unwrap()));
        assert!(!allowlist.allows("203.0.113.8".parse().unwrap()));
        assert!(!allowlist.allows("11.0.0.1".parse().unwrap()));
    }

    #[test]
    fn cidr_prefix_not_on_octet_boundary() {
        let allowlist = "192.168.4.0/22".parse::<IpAllowlist>().expect("Should parse");

        assert!(allowlist.allows("192.168.4.1".parse().unwrap()));
        assert!(allowlist.allows("192.168.7.255".parse().unwrap()));
        assert!(!allowlist.allows("192.168.8.1".parse().unwrap()));
    }

    #[test]
    fn family_mismatch_never_matches() {
        let allowlist = "10.0.0.0/8".parse::<IpAllowlist>().expect("Should parse");

        assert!(!allowlist.allows("::ffff:10.0.0.1".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn empty_input_gives_empty_allowlist() {
        let allowlist = " , ".parse::<IpAllowlist>().expect("Should parse");

        assert!(allowlist.is_empty());
        assert!(!allowlist.allows("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn rejects_malformed_entries() {
        assert_eq!(
            Err(ParseError::InvalidIp("not-an-ip".to_string())),
            "not-an-ip".parse::<IpAllowlist>()
        );
        assert_eq!(
            Err(ParseError::PrefixOutOfRange {
                network: "10.0.0.0".parse().unwrap(),
                prefix: 33
            }),
            "10.0.0.0/33".parse::<IpAllowlist>()
        );
        assert!("10.0.0.0/222222".parse::<IpAllowlist>().is_err());
    }
}
