use std::collections::BTreeMap;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::agent::Agent;
use crate::errortypes::Error;

pub const OPERATING_SYSTEM: &str = "operating_system";
pub const BROWSER: &str = "browser";
pub const LOCATION: &str = "location";
pub const WHITELIST_NETWORKS: &str = "whitelist_networks";
pub const BLACKLIST_NETWORKS: &str = "blacklist_networks";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub disable: bool,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub rules: BTreeMap<String, Rule>,
    #[serde(default)]
    pub admin_secondary: Option<Uuid>,
    #[serde(default)]
    pub user_secondary: Option<Uuid>,
    #[serde(default)]
    pub admin_device_secondary: bool,
    #[serde(default)]
    pub user_device_secondary: bool,
}

/// Whether an evaluation runs with the admin rule set (network
/// whitelist/blacklist) or the reduced user set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Admin,
    User,
}

/// Outcome of evaluating a policy against a request agent. The caller
/// owns any resulting mutation (disabling the subject user).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { error: String, message: String },
    Disable,
}

fn mismatch(rule: &Rule, error: &str, message: &str) -> Decision {
    if rule.disable {
        Decision::Disable
    } else {
        Decision::Deny {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

impl Policy {
    /// Evaluate the configured rules against a parsed request agent.
    /// Rules are checked in stable (sorted) order; the first mismatch
    /// decides. Network whitelist/blacklist rules apply to admin scope
    /// only.
    pub fn evaluate(&self, agent: &Agent, scope: Scope) -> Decision {
        for rule in self.rules.values() {
            match rule.kind.as_str() {
                OPERATING_SYSTEM => {
                    if !rule.values.iter().any(|v| *v == agent.operating_system) {
                        return mismatch(
                            rule,
                            "operating_system_policy",
                            "Operating system not permitted",
                        );
                    }
                }
                BROWSER => {
                    if !rule.values.iter().any(|v| *v == agent.browser) {
                        return mismatch(rule, "browser_policy", "Browser not permitted");
                    }
                }
                LOCATION => {
                    let region_key = agent.region_key();
                    if !rule
                        .values
                        .iter()
                        .any(|v| *v == agent.country_code || *v == region_key)
                    {
                        return mismatch(rule, "location_policy", "Location not permitted");
                    }
                }
                WHITELIST_NETWORKS if scope == Scope::Admin => {
                    if !self.any_network_contains(rule, agent) {
                        return mismatch(
                            rule,
                            "whitelist_networks_policy",
                            "Network not permitted",
                        );
                    }
                }
                BLACKLIST_NETWORKS if scope == Scope::Admin => {
                    if self.any_network_contains(rule, agent) {
                        return mismatch(
                            rule,
                            "blacklist_networks_policy",
                            "Network not permitted",
                        );
                    }
                }
                _ => {}
            }
        }

        Decision::Allow
    }

    /// Unparseable networks are skipped with a log, never fatal.
    fn any_network_contains(&self, rule: &Rule, agent: &Agent) -> bool {
        for value in &rule.values {
            let network = match IpNet::from_str(value) {
                Ok(network) => network,
                Err(e) => {
                    let err = Error::Parse(format!("policy: Failed to parse network: {}", e));
                    error!(network = %value, error = %err, "policy: Invalid network");
                    continue;
                }
            };

            if network.contains(&agent.ip) {
                return true;
            }
        }
        false
    }
}
