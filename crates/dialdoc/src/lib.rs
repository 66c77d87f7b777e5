//! dialdoc - one-shot diagnostics for dial-up style WAN connections.
//!
//! Library half of the `dialdoc` binary: credential waterfall, adapter
//! toggle guard, check pipeline and stages, workflow driver, and the Linux
//! capability implementations the binary runs against.

pub mod config;
pub mod credentials;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod stages;
pub mod system;
pub mod toggle;
pub mod workflow;

pub use config::DialdocConfig;
pub use credentials::{
    ConnectResult, CredentialRequest, CredentialResolver, CredentialSource, ResolvedCredential,
};
pub use pipeline::{Pipeline, StageFault, StageFaultKind, StageReport};
pub use progress::{LogCallback, ProgressSink};
pub use stages::{Capabilities, WorkflowVariant};
pub use toggle::{AdapterToggleGuard, ToggleRecordStore};
pub use workflow::{run_full_workflow, run_quick_workflow, WorkflowOptions, WorkflowResult};

/// Version of the dialdoc crates
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
