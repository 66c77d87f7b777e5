//! Diagnostic stages.
//!
//! Each stage takes the ledger by value plus whatever its predecessors
//! produced, appends its records, and returns a `StageReport`. Stages talk
//! to the host only through `Capabilities`.

pub mod adapter;
pub mod advanced;
pub mod connectivity;
pub mod dial;
pub mod ppp;
pub mod stability;
pub mod system;

use dialdoc_shared::{
    AdapterProvider, NetProbe, RouteTable, SavedCredentialStore, SystemFacts, WanDialer,
};

use crate::progress::ProgressSink;
use crate::workflow::WorkflowOptions;

pub use adapter::AdapterSelection;
pub use advanced::{PathQuality, TraceSummary};
pub use connectivity::ConnectivityOutput;
pub use dial::DialOutput;
pub use ppp::PppDiscovery;
pub use stability::StabilityOutput;
pub use system::SystemOutput;

/// Display ranks for ledger records
pub mod rank {
    pub const SWEEP: i32 = 0;
    pub const SYSTEM: i32 = 1;
    pub const WIFI_TOGGLE: i32 = 2;
    pub const ADAPTER: i32 = 3;
    pub const LINK: i32 = 4;
    pub const PPP_INTERFACE: i32 = 5;
    pub const CREDENTIALS: i32 = 6;
    pub const DIAL: i32 = 7;
    pub const PPP_ADDRESS: i32 = 8;
    pub const DEFAULT_ROUTE: i32 = 9;
    pub const DNS: i32 = 10;
    pub const PING: i32 = 11;
    pub const REACHABILITY: i32 = 12;
    pub const PACKET_LOSS: i32 = 13;
    pub const MULTI_DESTINATION: i32 = 14;
    pub const TRACEROUTE: i32 = 15;
    pub const STABILITY: i32 = 16;
    pub const RESTORE: i32 = 20;
}

/// Host capabilities a workflow runs against
pub struct Capabilities<'a> {
    pub adapters: &'a dyn AdapterProvider,
    pub probe: &'a dyn NetProbe,
    pub dialer: &'a dyn WanDialer,
    pub routes: &'a dyn RouteTable,
    pub facts: &'a dyn SystemFacts,
    pub saved_credentials: &'a dyn SavedCredentialStore,
}

/// Everything a stage may read
pub struct StageContext<'a> {
    pub caps: &'a Capabilities<'a>,
    pub options: &'a WorkflowOptions,
    pub progress: &'a ProgressSink,
}

/// Quick runs local checks only; Full adds dialing and path analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowVariant {
    Quick,
    Full,
}

impl WorkflowVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowVariant::Quick => "quick",
            WorkflowVariant::Full => "full",
        }
    }
}

/// "3 of 4" style ratio used in details
pub(crate) fn ratio(n: usize, total: usize) -> String {
    format!("{} of {}", n, total)
}
