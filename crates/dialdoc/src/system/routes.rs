//! PPP interfaces, addresses and default routes through iproute2.

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use dialdoc_shared::{
    AddressInfo, AdapterStatus, CapabilityError, InterfaceInfo, MediaType, RouteInfo, RouteTable,
};

use super::adapters::{classify_ip_failure, list_links};
use super::command;

const IP_TIMEOUT: Duration = Duration::from_secs(5);

/// Directories where pppd writes `ppp-<linkname>.pid`
const PPP_PID_DIRS: &[&str] = &["/run", "/var/run"];

/// Parse `ip -o -4 addr show` lines:
/// `7: ppp0    inet 81.2.69.160 peer 10.0.0.1/32 scope global ppp0\ ...`
pub fn parse_addresses(output: &str) -> Vec<AddressInfo> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let interface = tokens.get(1)?.trim_end_matches(':').split('@').next()?;
            let inet = tokens.iter().position(|t| *t == "inet" || *t == "inet6")?;
            let (local, local_prefix) = split_cidr(tokens.get(inet + 1)?)?;

            let (peer, prefix_len) = match tokens.get(inet + 2) {
                Some(&"peer") => {
                    let (peer, prefix) = split_cidr(tokens.get(inet + 3)?)?;
                    (Some(peer), prefix.or(local_prefix))
                }
                _ => (None, local_prefix),
            };

            let default_prefix = if local.is_ipv4() { 32 } else { 128 };
            Some(AddressInfo {
                interface: interface.to_string(),
                address: local,
                prefix_len: prefix_len.unwrap_or(default_prefix),
                peer,
            })
        })
        .collect()
}

fn split_cidr(token: &str) -> Option<(IpAddr, Option<u8>)> {
    match token.split_once('/') {
        Some((addr, prefix)) => Some((addr.parse().ok()?, prefix.parse().ok())),
        None => Some((token.parse().ok()?, None)),
    }
}

/// Parse `ip route show default`:
/// `default via 192.168.1.1 dev eth0 proto dhcp src 192.168.1.5 metric 100`
pub fn parse_default_routes(output: &str) -> Vec<RouteInfo> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let destination = tokens.first()?.to_string();
            let value = |key: &str| {
                tokens
                    .iter()
                    .position(|t| *t == key)
                    .and_then(|i| tokens.get(i + 1))
                    .copied()
            };
            Some(RouteInfo {
                destination,
                gateway: value("via").and_then(|g| g.parse().ok()),
                interface: value("dev")?.to_string(),
                metric: value("metric").and_then(|m| m.parse().ok()).unwrap_or(0),
            })
        })
        .filter(RouteInfo::is_default)
        .collect()
}

/// Map interface name to the pppd link name from `ppp-<linkname>.pid`
/// files (second line holds the interface).
fn ppp_link_names(dirs: &[&Path]) -> Vec<(String, String)> {
    let mut names = Vec::new();
    for dir in dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(link) = file_name
                .strip_prefix("ppp-")
                .and_then(|n| n.strip_suffix(".pid"))
            else {
                continue;
            };
            match fs::read_to_string(entry.path()) {
                Ok(content) => {
                    if let Some(iface) = content.lines().nth(1).map(str::trim).filter(|s| !s.is_empty()) {
                        names.push((iface.to_string(), link.to_string()));
                    }
                }
                Err(e) => debug!("Cannot read {}: {}", entry.path().display(), e),
            }
        }
    }
    names
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxRoutes;

impl RouteTable for LinuxRoutes {
    fn ppp_interfaces(&self) -> Result<Vec<InterfaceInfo>, CapabilityError> {
        let dirs: Vec<&Path> = PPP_PID_DIRS.iter().map(Path::new).collect();
        let aliases = ppp_link_names(&dirs);

        Ok(list_links()?
            .into_iter()
            .filter(|link| link.link_type == "ppp")
            .map(|link| InterfaceInfo {
                alias: aliases
                    .iter()
                    .find(|(iface, _)| *iface == link.name)
                    .map(|(_, alias)| alias.clone()),
                media_type: MediaType::Ppp,
                is_up: link.status() == AdapterStatus::Up,
                mtu: link.mtu,
                name: link.name,
            })
            .collect())
    }

    fn addresses(&self, interface: &str) -> Result<Vec<AddressInfo>, CapabilityError> {
        let out = command::run("ip", &["-o", "-4", "addr", "show", "dev", interface], IP_TIMEOUT)?;
        if !out.success() {
            return Err(classify_ip_failure(interface, out));
        }
        Ok(parse_addresses(&out.stdout))
    }

    fn default_routes(&self) -> Result<Vec<RouteInfo>, CapabilityError> {
        let out = command::run("ip", &["route", "show", "default"], IP_TIMEOUT)?;
        if !out.success() {
            return Err(out.into_failure());
        }
        Ok(parse_default_routes(&out.stdout))
    }

    fn set_route_metric(&self, route: &RouteInfo, metric: u32) -> Result<(), CapabilityError> {
        let metric_arg = metric.to_string();
        let gateway = route.gateway.map(|g| g.to_string());
        let mut args = vec!["route", "replace", "default", "dev", route.interface.as_str()];
        if let Some(gw) = gateway.as_deref() {
            args.extend(["via", gw]);
        }
        args.extend(["metric", metric_arg.as_str()]);

        let out = command::run("ip", &args, IP_TIMEOUT)?;
        if !out.success() {
            return Err(classify_ip_failure(&route.interface, out));
        }
        info!(
            "Default route via {} now has metric {}",
            route.interface, metric
        );

        // The metric is part of the route key: drop the old entry
        if route.metric != metric {
            let old_metric = route.metric.to_string();
            let del = command::run(
                "ip",
                &["route", "del", "default", "dev", &route.interface, "metric", &old_metric],
                IP_TIMEOUT,
            )?;
            if !del.success() {
                warn!(
                    "Could not remove old default route via {} (metric {}): {}",
                    route.interface,
                    route.metric,
                    del.stderr.trim()
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_ppp_address_with_peer() {
        let out = "7: ppp0    inet 81.2.69.160 peer 10.64.64.1/32 scope global ppp0\\       valid_lft forever preferred_lft forever\n";
        let addrs = parse_addresses(out);
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].interface, "ppp0");
        assert_eq!(addrs[0].address, "81.2.69.160".parse::<IpAddr>().unwrap());
        assert_eq!(addrs[0].peer, Some("10.64.64.1".parse().unwrap()));
        assert_eq!(addrs[0].prefix_len, 32);
    }

    #[test]
    fn test_parse_plain_address() {
        let out = "2: enp3s0    inet 192.168.1.5/24 brd 192.168.1.255 scope global dynamic enp3s0\\       valid_lft 8000sec\n";
        let addrs = parse_addresses(out);
        assert_eq!(addrs[0].prefix_len, 24);
        assert_eq!(addrs[0].peer, None);
    }

    #[test]
    fn test_parse_default_routes() {
        let out = "default via 192.168.1.1 dev enp3s0 proto dhcp src 192.168.1.5 metric 100\n\
                   default dev ppp0 scope link metric 5\n\
                   default dev wg0 scope link\n";
        let routes = parse_default_routes(out);
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].gateway, Some("192.168.1.1".parse().unwrap()));
        assert_eq!(routes[0].metric, 100);
        assert_eq!(routes[1].interface, "ppp0");
        assert_eq!(routes[1].gateway, None);
        assert_eq!(routes[2].metric, 0);
    }

    #[test]
    fn test_ppp_link_names() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ppp-dsl.pid"), "1234\nppp0\n").unwrap();
        fs::write(dir.path().join("ppp0.pid"), "1234\n").unwrap();
        fs::write(dir.path().join("ppp-broken.pid"), "99\n").unwrap();
        let names = ppp_link_names(&[dir.path()]);
        assert_eq!(names, vec![("ppp0".to_string(), "dsl".to_string())]);
    }
}
