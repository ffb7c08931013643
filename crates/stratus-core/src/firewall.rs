use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errortypes::ErrorData;

pub const ALL: &str = "all";
pub const ICMP: &str = "icmp";
pub const TCP: &str = "tcp";
pub const UDP: &str = "udp";

/// Ingress rule. Port is empty for `all`/`icmp`, a decimal port or
/// `N-M` range for `tcp`/`udp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub source_ips: Vec<String>,
    pub protocol: String,
    #[serde(default)]
    pub port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Firewall {
    pub id: Uuid,
    pub name: String,
    pub organization: Uuid,
    #[serde(default)]
    pub network_roles: Vec<String>,
    #[serde(default)]
    pub ingress: Vec<Rule>,
}

fn invalid_port() -> ErrorData {
    ErrorData::new("invalid_ingress_rule_port", "Invalid ingress rule port")
}

/// Canonicalize a port spec: `N` or `N-M`, N,M in [1,65535], M > N.
/// Output is decimal with no leading zeros.
fn parse_port(port: &str) -> Result<String, ErrorData> {
    let mut parts = port.splitn(2, '-');
    let low_str = parts.next().unwrap_or("");
    let low: u32 = low_str.parse().map_err(|_| invalid_port())?;
    if !(1..=65535).contains(&low) {
        return Err(invalid_port());
    }

    let mut parsed = low.to_string();
    if let Some(high_str) = parts.next() {
        let high: u32 = high_str.parse().map_err(|_| invalid_port())?;
        if !(1..=65535).contains(&high) || high <= low {
            return Err(invalid_port());
        }
        parsed = format!("{}-{}", low, high);
    }

    Ok(parsed)
}

impl Firewall {
    /// Validate and canonicalize every ingress rule in place. Revalidating
    /// the output is a fixpoint.
    pub fn validate(&mut self) -> Result<(), ErrorData> {
        for rule in &mut self.ingress {
            match rule.protocol.as_str() {
                ALL | ICMP => {
                    rule.port = String::new();
                }
                TCP | UDP => {
                    rule.port = parse_port(&rule.port)?;
                }
                _ => {
                    return Err(ErrorData::new(
                        "invalid_ingress_rule_protocol",
                        "Invalid ingress rule protocol",
                    ));
                }
            }

            for source_ip in &mut rule.source_ips {
                if source_ip.is_empty() {
                    return Err(ErrorData::new(
                        "invalid_ingress_rule_source_ip",
                        "Empty ingress rule source IP",
                    ));
                }

                let mut cidr = source_ip.clone();
                if !cidr.contains('/') {
                    if cidr.contains(':') {
                        cidr.push_str("/128");
                    } else {
                        cidr.push_str("/32");
                    }
                }

                let network = IpNet::from_str(&cidr).map_err(|_| {
                    ErrorData::new(
                        "invalid_ingress_rule_source_ip",
                        "Invalid ingress rule source IP",
                    )
                })?;

                *source_ip = network.trunc().to_string();
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn firewall_with(ingress: Vec<Rule>) -> Firewall {
        Firewall {
            id: Uuid::new_v4(),
            name: "web".to_string(),
            organization: Uuid::new_v4(),
            network_roles: vec!["web".to_string()],
            ingress,
        }
    }

    fn tcp_rule(port: &str, sources: &[&str]) -> Rule {
        Rule {
            source_ips: sources.iter().map(|s| s.to_string()).collect(),
            protocol: TCP.to_string(),
            port: port.to_string(),
        }
    }

    #[test]
    fn test_all_and_icmp_clear_port() {
        let mut fire = firewall_with(vec![
            Rule {
                source_ips: vec!["10.0.0.0/8".to_string()],
                protocol: ALL.to_string(),
                port: "443".to_string(),
            },
            Rule {
                source_ips: vec!["10.0.0.0/8".to_string()],
                protocol: ICMP.to_string(),
                port: "1-100".to_string(),
            },
        ]);
        fire.validate().unwrap();
        assert_eq!(fire.ingress[0].port, "");
        assert_eq!(fire.ingress[1].port, "");
    }

    #[test]
    fn test_port_acceptance_table() {
        for port in ["80", "1", "65535", "100-200", "1-65535"] {
            let mut fire = firewall_with(vec![tcp_rule(port, &["10.0.0.0/8"])]);
            assert!(fire.validate().is_ok(), "port {:?} should be valid", port);
        }

        for port in ["0", "65536", "100-50", "100-100", "abc", "", "-5"] {
            let mut fire = firewall_with(vec![tcp_rule(port, &["10.0.0.0/8"])]);
            assert_eq!(
                fire.validate().unwrap_err().error,
                "invalid_ingress_rule_port",
                "port {:?} should be rejected",
                port
            );
        }
    }

    #[test]
    fn test_port_leading_zeros_canonicalized() {
        let mut fire = firewall_with(vec![tcp_rule("0080-0443", &["10.0.0.0/8"])]);
        fire.validate().unwrap();
        assert_eq!(fire.ingress[0].port, "80-443");
    }

    #[test]
    fn test_bare_addresses_get_host_masks() {
        let mut fire = firewall_with(vec![tcp_rule("22", &["10.0.0.1", "2001:db8::1"])]);
        fire.validate().unwrap();
        assert_eq!(fire.ingress[0].source_ips[0], "10.0.0.1/32");
        assert_eq!(fire.ingress[0].source_ips[1], "2001:db8::1/128");
    }

    #[test]
    fn test_empty_source_rejected() {
        let mut fire = firewall_with(vec![tcp_rule("22", &[""])]);
        assert_eq!(
            fire.validate().unwrap_err().error,
            "invalid_ingress_rule_source_ip"
        );
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let mut fire = firewall_with(vec![Rule {
            source_ips: vec![],
            protocol: "sctp".to_string(),
            port: "22".to_string(),
        }]);
        assert_eq!(
            fire.validate().unwrap_err().error,
            "invalid_ingress_rule_protocol"
        );
    }

    proptest! {
        // Re-validating any valid rule's output must be a fixpoint.
        #[test]
        fn prop_validate_fixpoint(
            low in 1u32..=65535,
            span in 0u32..1000,
            octets in proptest::array::uniform4(0u8..=255),
            prefix in 0u8..=32,
        ) {
            let port = if span == 0 {
                low.to_string()
            } else {
                let high = (low + span).min(65535);
                if high <= low {
                    low.to_string()
                } else {
                    format!("{}-{}", low, high)
                }
            };
            let source = format!(
                "{}.{}.{}.{}/{}",
                octets[0], octets[1], octets[2], octets[3], prefix
            );

            let mut fire = firewall_with(vec![tcp_rule(&port, &[&source])]);
            prop_assert!(fire.validate().is_ok());

            let canonical = fire.clone();
            fire.validate().unwrap();
            prop_assert_eq!(fire.ingress, canonical.ingress);
        }
    }
}
