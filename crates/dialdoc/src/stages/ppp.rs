//! PPP/WAN interface discovery: session interface, assigned address,
//! default-route ownership and route-metric tuning.

use tracing::{info, warn};

use dialdoc_shared::{
    AddressClass, AddressInfo, HealthLedger, HealthStatus, InterfaceInfo, RouteInfo,
};

use super::{rank, StageContext, WorkflowVariant};
use crate::pipeline::StageReport;

#[derive(Debug, Clone, Default)]
pub struct PppDiscovery {
    pub interface: Option<InterfaceInfo>,
    pub address: Option<AddressInfo>,
    pub default_route: Option<RouteInfo>,
    /// New PPP route metric when tuning changed it
    pub metric_adjusted: Option<u32>,
}

/// Interface for `connection` if one carries its alias, else the first up
/// interface, else the first one.
pub fn pick_interface<'a>(
    interfaces: &'a [InterfaceInfo],
    connection: Option<&str>,
) -> Option<&'a InterfaceInfo> {
    if let Some(name) = connection.filter(|n| !n.is_empty()) {
        if let Some(found) = interfaces.iter().find(|i| i.alias.as_deref() == Some(name)) {
            return Some(found);
        }
    }
    interfaces
        .iter()
        .find(|i| i.is_up)
        .or_else(|| interfaces.first())
}

/// Metric to give the PPP route so it beats `winner`: the configured
/// metric when that already wins, otherwise one below the winner.
pub fn target_metric(configured: u32, winner: &RouteInfo) -> Option<u32> {
    if configured < winner.metric {
        Some(configured)
    } else {
        winner.metric.checked_sub(1)
    }
}

pub fn check_ppp(
    mut ledger: HealthLedger,
    ctx: &StageContext<'_>,
    variant: WorkflowVariant,
    connection: Option<&str>,
) -> StageReport<PppDiscovery> {
    // Absence of a session is expected in quick mode
    let missing = match variant {
        WorkflowVariant::Quick => HealthStatus::Warn,
        WorkflowVariant::Full => HealthStatus::Fail,
    };

    let interfaces = match ctx.caps.routes.ppp_interfaces() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            ledger.note(
                rank::PPP_INTERFACE,
                "PPP interface",
                missing,
                format!("could not list PPP interfaces: {}", e),
            );
            return StageReport::done(ledger, PppDiscovery::default());
        }
    };

    let Some(iface) = pick_interface(&interfaces, connection).cloned() else {
        ledger.note(
            rank::PPP_INTERFACE,
            "PPP interface",
            missing,
            "no PPP interface found (not connected)",
        );
        return StageReport::done(ledger, PppDiscovery::default());
    };

    let mut described = iface.name.clone();
    if let Some(alias) = &iface.alias {
        described.push_str(&format!(" ({})", alias));
    }
    if let Some(mtu) = iface.mtu {
        described.push_str(&format!(", mtu {}", mtu));
    }
    if iface.is_up {
        ledger.ok(rank::PPP_INTERFACE, "PPP interface", described);
    } else {
        ledger.note(
            rank::PPP_INTERFACE,
            "PPP interface",
            missing,
            format!("{} is down", described),
        );
    }
    ctx.progress.line(format!("PPP interface: {}", iface.name));

    let address = check_address(&mut ledger, ctx, &iface);
    let (default_route, metric_adjusted) = check_default_route(&mut ledger, ctx, variant, &iface);

    StageReport::done(
        ledger,
        PppDiscovery {
            interface: Some(iface),
            address,
            default_route,
            metric_adjusted,
        },
    )
}

fn check_address(
    ledger: &mut HealthLedger,
    ctx: &StageContext<'_>,
    iface: &InterfaceInfo,
) -> Option<AddressInfo> {
    let addresses = match ctx.caps.routes.addresses(&iface.name) {
        Ok(addresses) => addresses,
        Err(e) => {
            ledger.fail(
                rank::PPP_ADDRESS,
                "PPP address",
                format!("could not read addresses of {}: {}", iface.name, e),
            );
            return None;
        }
    };

    let Some(address) = addresses
        .iter()
        .find(|a| a.address.is_ipv4())
        .or_else(|| addresses.first())
        .cloned()
    else {
        ledger.fail(
            rank::PPP_ADDRESS,
            "PPP address",
            format!("no address assigned to {}", iface.name),
        );
        return None;
    };

    let peer = address
        .peer
        .map(|p| format!(", peer {}", p))
        .unwrap_or_default();
    match address.classify() {
        AddressClass::Public => ledger.ok(
            rank::PPP_ADDRESS,
            "PPP address",
            format!("{}{}", address.address, peer),
        ),
        AddressClass::CarrierGradeNat => ledger.warn(
            rank::PPP_ADDRESS,
            "PPP address",
            format!("{} is carrier-grade NAT space{}", address.address, peer),
        ),
        AddressClass::Private => ledger.warn(
            rank::PPP_ADDRESS,
            "PPP address",
            format!("{} is a private address{}", address.address, peer),
        ),
        AddressClass::LinkLocal => ledger.fail(
            rank::PPP_ADDRESS,
            "PPP address",
            format!("{} is link-local, IPCP negotiation failed", address.address),
        ),
        AddressClass::Unspecified => ledger.fail(
            rank::PPP_ADDRESS,
            "PPP address",
            format!("{} has no usable address", iface.name),
        ),
    }
    Some(address)
}

fn check_default_route(
    ledger: &mut HealthLedger,
    ctx: &StageContext<'_>,
    variant: WorkflowVariant,
    iface: &InterfaceInfo,
) -> (Option<RouteInfo>, Option<u32>) {
    let routes = match ctx.caps.routes.default_routes() {
        Ok(routes) => routes,
        Err(e) => {
            ledger.warn(
                rank::DEFAULT_ROUTE,
                "Default route",
                format!("could not read routing table: {}", e),
            );
            return (None, None);
        }
    };

    let Some(ppp_route) = routes.iter().find(|r| r.interface == iface.name).cloned() else {
        let status = match variant {
            WorkflowVariant::Quick => HealthStatus::Warn,
            WorkflowVariant::Full => HealthStatus::Fail,
        };
        ledger.note(
            rank::DEFAULT_ROUTE,
            "Default route",
            status,
            format!("no default route via {}", iface.name),
        );
        return (None, None);
    };

    // min_by_key keeps the first of equal metrics, matching kernel order
    let winner = routes.iter().min_by_key(|r| r.metric).unwrap_or(&ppp_route);
    if winner.interface == iface.name {
        ledger.ok(
            rank::DEFAULT_ROUTE,
            "Default route",
            format!("via {} (metric {})", iface.name, ppp_route.metric),
        );
        return (Some(ppp_route), None);
    }

    let contest = format!(
        "{} (metric {}) wins over {} (metric {})",
        winner.interface, winner.metric, iface.name, ppp_route.metric
    );
    let routing = &ctx.options.routing;
    if variant == WorkflowVariant::Quick || !routing.tune_route_metric {
        ledger.warn(rank::DEFAULT_ROUTE, "Default route", contest);
        return (Some(ppp_route), None);
    }

    let Some(metric) = target_metric(routing.ppp_route_metric, winner) else {
        ledger.warn(
            rank::DEFAULT_ROUTE,
            "Default route",
            format!("{}; cannot go below metric 0", contest),
        );
        return (Some(ppp_route), None);
    };

    match ctx.caps.routes.set_route_metric(&ppp_route, metric) {
        Ok(()) => {
            info!("Lowered {} default route metric to {}", iface.name, metric);
            ctx.progress.line(format!(
                "Lowered {} default route metric from {} to {}",
                iface.name, ppp_route.metric, metric
            ));
            ledger.ok(
                rank::DEFAULT_ROUTE,
                "Default route",
                format!(
                    "via {}, metric lowered from {} to {}",
                    iface.name, ppp_route.metric, metric
                ),
            );
            let tuned = RouteInfo {
                metric,
                ..ppp_route
            };
            (Some(tuned), Some(metric))
        }
        Err(e) => {
            warn!("Route metric change on {} failed: {}", iface.name, e);
            ledger.warn(
                rank::DEFAULT_ROUTE,
                "Default route",
                format!("{}; metric change failed: {}", contest, e),
            );
            (Some(ppp_route), None)
        }
    }
}
