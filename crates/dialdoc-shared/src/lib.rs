//! Shared types for dialdoc components.
//!
//! Health ledger, network model, host capability traits, errors and
//! redaction. Everything here is free of OS calls.

pub mod capability;
pub mod error;
pub mod health;
pub mod net;
pub mod redact;

pub use capability::{
    AdapterProvider, NetProbe, RouteTable, SavedCredential, SavedCredentialStore, SystemFacts,
    WanDialer,
};
pub use error::{CapabilityError, DialdocError, HealthError};
pub use health::{HealthLedger, HealthRecord, HealthStatus, HealthSummary, StatusCounts};
pub use net::{
    AdapterInfo, AdapterStatus, AddressClass, AddressInfo, DialOutcome, HostFacts, InterfaceInfo,
    MediaType, PingOutcome, RouteInfo, TraceHop,
};

/// System config file path
pub const CONFIG_PATH: &str = "/etc/dialdoc/config.toml";

/// State directory used when running as root
pub const STATE_DIR: &str = "/var/lib/dialdoc";

/// Subdirectory of the state dir holding adapter toggle records
pub const TOGGLE_RECORD_DIR: &str = "toggle";
