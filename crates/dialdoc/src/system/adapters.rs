//! Adapter enumeration and control through iproute2.

use std::path::Path;
use std::time::Duration;
use tracing::info;

use dialdoc_shared::{AdapterInfo, AdapterProvider, AdapterStatus, CapabilityError, MediaType};

use super::command;

const IP_TIMEOUT: Duration = Duration::from_secs(5);

/// Name prefixes of software interfaces that are never WAN candidates
const VIRTUAL_PREFIXES: &[&str] = &[
    "veth", "docker", "br-", "virbr", "vnet", "tun", "tap", "wg", "vmnet", "vboxnet", "tailscale",
];

/// One line of `ip -o link show`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub name: String,
    pub flags: Vec<String>,
    pub mtu: Option<u32>,
    /// Token after `link/`: ether, ppp, loopback, none, ...
    pub link_type: String,
    pub mac: Option<String>,
}

impl LinkEntry {
    fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn status(&self) -> AdapterStatus {
        if !self.has_flag("UP") {
            AdapterStatus::Down
        } else if self.has_flag("LOWER_UP") {
            AdapterStatus::Up
        } else {
            AdapterStatus::Disconnected
        }
    }

    /// Media type; `is_wireless` answers for names with a wireless sysfs dir
    pub fn media_type(&self, is_wireless: impl Fn(&str) -> bool) -> MediaType {
        match self.link_type.as_str() {
            "loopback" => MediaType::Loopback,
            "ppp" => MediaType::Ppp,
            "ether" => {
                if is_wireless(&self.name) || self.name.starts_with("wl") {
                    MediaType::Wireless
                } else if VIRTUAL_PREFIXES.iter().any(|p| self.name.starts_with(p)) {
                    MediaType::Virtual
                } else {
                    MediaType::Ethernet
                }
            }
            "none" | "void" | "ipip" | "sit" | "gre" => MediaType::Virtual,
            _ => MediaType::Other,
        }
    }
}

/// Parse one `ip -o link show` line:
/// `2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 ... \    link/ether aa:bb:.. brd ..`
pub fn parse_link_line(line: &str) -> Option<LinkEntry> {
    let mut parts = line.splitn(3, ": ");
    let _index = parts.next()?.trim().parse::<u32>().ok()?;
    let raw_name = parts.next()?.trim();
    let rest = parts.next()?;

    // veth pairs and VLANs show as name@peer
    let name = raw_name.split('@').next()?.to_string();
    if name.is_empty() {
        return None;
    }

    let flags = rest
        .strip_prefix('<')
        .and_then(|r| r.split_once('>'))
        .map(|(flags, _)| flags.split(',').map(str::to_string).collect())
        .unwrap_or_default();

    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let mtu = tokens
        .iter()
        .position(|t| *t == "mtu")
        .and_then(|i| tokens.get(i + 1))
        .and_then(|v| v.parse().ok());

    let link_pos = tokens.iter().position(|t| t.starts_with("link/"));
    let link_type = link_pos
        .and_then(|i| tokens[i].strip_prefix("link/"))
        .unwrap_or("unknown")
        .to_string();
    let mac = link_pos
        .and_then(|i| tokens.get(i + 1))
        .filter(|m| m.len() == 17 && m.matches(':').count() == 5)
        .map(|m| m.to_string());

    Some(LinkEntry {
        name,
        flags,
        mtu,
        link_type,
        mac,
    })
}

pub fn parse_link_output(output: &str) -> Vec<LinkEntry> {
    output.lines().filter_map(parse_link_line).collect()
}

/// Current links from `ip -o link show`
pub fn list_links() -> Result<Vec<LinkEntry>, CapabilityError> {
    let out = command::run("ip", &["-o", "link", "show"], IP_TIMEOUT)?;
    if !out.success() {
        return Err(out.into_failure());
    }
    Ok(parse_link_output(&out.stdout))
}

fn sysfs_wireless(name: &str) -> bool {
    Path::new("/sys/class/net").join(name).join("wireless").exists()
}

/// Map `ip link set` stderr to a capability error
pub fn classify_ip_failure(name: &str, out: command::CommandOutput) -> CapabilityError {
    let stderr = out.stderr.to_lowercase();
    if stderr.contains("cannot find device") || stderr.contains("does not exist") {
        CapabilityError::NotFound(name.to_string())
    } else if stderr.contains("operation not permitted") || stderr.contains("permission denied") {
        CapabilityError::PermissionDenied(format!("changing {} needs root", name))
    } else {
        out.into_failure()
    }
}

/// Adapters as seen by iproute2 and sysfs
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxAdapters;

impl AdapterProvider for LinuxAdapters {
    fn list_adapters(&self) -> Result<Vec<AdapterInfo>, CapabilityError> {
        Ok(list_links()?
            .into_iter()
            .map(|link| AdapterInfo {
                status: link.status(),
                media_type: link.media_type(sysfs_wireless),
                mac_address: link.mac.clone(),
                name: link.name,
            })
            .collect())
    }

    fn set_adapter_enabled(&self, name: &str, enabled: bool) -> Result<(), CapabilityError> {
        let state = if enabled { "up" } else { "down" };
        let out = command::run("ip", &["link", "set", "dev", name, state], IP_TIMEOUT)?;
        if !out.success() {
            return Err(classify_ip_failure(name, out));
        }
        info!("ip link set {} {}", name, state);
        Ok(())
    }
}
