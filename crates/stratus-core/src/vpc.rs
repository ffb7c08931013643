use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errortypes::ErrorData;

/// A VPC route: destination CIDR forwarded via a target address inside
/// the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub destination: String,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vpc {
    pub id: Uuid,
    pub name: String,
    pub organization: Uuid,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl Vpc {
    /// Validate and canonicalize routes: destination must parse as a v4
    /// or v6 CIDR, target as an address of the matching family.
    pub fn validate(&mut self) -> Result<(), ErrorData> {
        for route in &mut self.routes {
            let dest = IpNet::from_str(&route.destination).map_err(|_| {
                ErrorData::new("invalid_route_destination", "Invalid route destination")
            })?;

            let target = IpAddr::from_str(&route.target)
                .map_err(|_| ErrorData::new("invalid_route_target", "Invalid route target"))?;

            let family_match = matches!(
                (&dest, &target),
                (IpNet::V4(_), IpAddr::V4(_)) | (IpNet::V6(_), IpAddr::V6(_))
            );
            if !family_match {
                return Err(ErrorData::new(
                    "invalid_route_target",
                    "Route target family does not match destination",
                ));
            }

            route.destination = dest.trunc().to_string();
            route.target = target.to_string();
        }

        Ok(())
    }
}
