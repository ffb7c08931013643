use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use anyhow::Result;
use ipnet::IpNet;
use uuid::Uuid;

use stratus_core::vm;
use stratus_core::vpc::Route;

use crate::exec;

/// Routing-table metric marking routes owned by this system. Any route
/// at another metric is foreign and left alone.
pub const ROUTE_METRIC: &str = "97";

const NO_IPV6: &str = "not configured in this system";

/// Route probing and mutation inside an instance namespace. A trait so
/// the reconciler can be driven without touching the kernel.
pub trait RouteOps: Send + Sync {
    /// Observed system-owned routes, split by family. None when the
    /// namespace yields no output yet.
    #[allow(clippy::type_complexity)]
    fn get(&self, instance_id: Uuid) -> Result<Option<(Vec<Route>, Vec<Route>)>>;
    fn add(&self, namespace: &str, route: &Route, ipv6: bool) -> Result<()>;
    fn del(&self, namespace: &str, route: &Route, ipv6: bool) -> Result<()>;
}

/// Kernel-backed implementation shelling `ip netns exec`.
#[derive(Default)]
pub struct IpRouteOps;

impl RouteOps for IpRouteOps {
    fn get(&self, instance_id: Uuid) -> Result<Option<(Vec<Route>, Vec<Route>)>> {
        let namespace = vm::get_namespace(instance_id, 0);

        let output = exec::combined_output_logged(
            &[NO_IPV6],
            "ip",
            &["netns", "exec", &namespace, "route", "-n"],
        )
        .unwrap_or_default();
        if output.is_empty() {
            return Ok(None);
        }
        let routes = parse_routes4(&output);

        let output6 = exec::combined_output_logged(
            &[NO_IPV6],
            "ip",
            &["netns", "exec", &namespace, "route", "-6", "-n"],
        )
        .unwrap_or_default();
        let routes6 = parse_routes6(&output6);

        Ok(Some((routes, routes6)))
    }

    fn add(&self, namespace: &str, route: &Route, ipv6: bool) -> Result<()> {
        exec::combined_output_logged(
            &["File exists"],
            "ip",
            &route_args("add", namespace, route, ipv6),
        )?;
        Ok(())
    }

    fn del(&self, namespace: &str, route: &Route, ipv6: bool) -> Result<()> {
        exec::combined_output_logged(&[], "ip", &route_args("del", namespace, route, ipv6))?;
        Ok(())
    }
}

fn route_args<'a>(action: &'a str, namespace: &'a str, route: &'a Route, ipv6: bool) -> Vec<&'a str> {
    let mut args = vec!["netns", "exec", namespace, "ip"];
    if ipv6 {
        args.push("-6");
    }
    args.extend([
        "route",
        action,
        route.destination.as_str(),
        "via",
        route.target.as_str(),
        "metric",
        ROUTE_METRIC,
    ]);
    args
}

/// Parse `route -n` output: two header lines, then
/// `Destination Gateway Genmask Flags Metric Ref Use Iface`. Only rows at
/// the sentinel metric are ours; default/zero rows are excluded.
fn parse_routes4(output: &str) -> Vec<Route> {
    let mut routes = Vec::new();

    for line in output.lines().skip(2) {
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            continue;
        }

        if fields[4] != ROUTE_METRIC {
            continue;
        }

        if fields[0] == "0.0.0.0" || fields[1] == "0.0.0.0" {
            continue;
        }

        let Some(prefix) = mask_prefix(fields[2]) else {
            continue;
        };

        routes.push(Route {
            destination: format!("{}/{}", fields[0], prefix),
            target: fields[1].to_string(),
        });
    }

    routes
}

/// Parse `route -6 -n` output: two header lines, then
/// `Destination NextHop Flag Met Ref Use If`. Destinations and targets
/// are re-rendered through the parsers so cached values compare equal to
/// canonical VPC routes.
fn parse_routes6(output: &str) -> Vec<Route> {
    let mut routes = Vec::new();

    for line in output.lines().skip(2) {
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 7 {
            continue;
        }

        if fields[3] != ROUTE_METRIC {
            continue;
        }

        let Ok(destination) = IpNet::from_str(fields[0]) else {
            continue;
        };

        let Ok(target) = IpAddr::from_str(fields[1]) else {
            continue;
        };

        routes.push(Route {
            destination: destination.trunc().to_string(),
            target: target.to_string(),
        });
    }

    routes
}

/// Dotted netmask to prefix length; non-contiguous masks are rejected.
fn mask_prefix(mask: &str) -> Option<u32> {
    let mask: Ipv4Addr = mask.parse().ok()?;
    let bits = u32::from(mask);
    let ones = bits.leading_ones();
    if bits.count_ones() != ones {
        return None;
    }
    Some(ones)
}
