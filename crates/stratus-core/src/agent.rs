use std::net::{IpAddr, Ipv4Addr};

/// Parsed request context used for policy evaluation: user-agent
/// platform, geo-IP region and the client address. Parsing itself
/// happens at the handler boundary.
#[derive(Debug, Clone)]
pub struct Agent {
    pub operating_system: String,
    pub browser: String,
    pub country_code: String,
    pub region_code: String,
    pub ip: IpAddr,
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            operating_system: String::new(),
            browser: String::new(),
            country_code: String::new(),
            region_code: String::new(),
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl Agent {
    /// Region key matched by location rules: `<country>_<region>`.
    pub fn region_key(&self) -> String {
        format!("{}_{}", self.country_code, self.region_code)
    }
}
