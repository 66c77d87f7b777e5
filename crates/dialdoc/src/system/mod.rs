//! Linux implementations of the host capabilities.
//!
//! Everything shells out to standard tools (iproute2, iputils ping,
//! getent, traceroute, pppd) under a deadline, or reads /etc/ppp and
//! sysfs directly.

pub mod adapters;
pub mod command;
pub mod dialer;
pub mod facts;
pub mod probe;
pub mod routes;
pub mod secrets;

pub use adapters::LinuxAdapters;
pub use dialer::PppDialer;
pub use facts::LinuxFacts;
pub use probe::LinuxProbe;
pub use routes::LinuxRoutes;
pub use secrets::PppSecretsStore;

use crate::stages::Capabilities;

/// The real host
#[derive(Debug, Default, Clone)]
pub struct LinuxHost {
    pub adapters: LinuxAdapters,
    pub probe: LinuxProbe,
    pub dialer: PppDialer,
    pub routes: LinuxRoutes,
    pub facts: LinuxFacts,
    pub secrets: PppSecretsStore,
}

impl LinuxHost {
    pub fn capabilities(&self) -> Capabilities<'_> {
        Capabilities {
            adapters: &self.adapters,
            probe: &self.probe,
            dialer: &self.dialer,
            routes: &self.routes,
            facts: &self.facts,
            saved_credentials: &self.secrets,
        }
    }
}
