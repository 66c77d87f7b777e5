//! Host facts from sysinfo, privilege check from nix.

use sysinfo::System;

use dialdoc_shared::{CapabilityError, HostFacts, SystemFacts};

#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxFacts;

impl SystemFacts for LinuxFacts {
    fn collect(&self) -> Result<HostFacts, CapabilityError> {
        Ok(HostFacts {
            os_name: System::name(),
            os_version: System::os_version(),
            kernel_version: System::kernel_version(),
            hostname: System::host_name(),
            privileged: nix::unistd::geteuid().is_root(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_reports_kernel() {
        let facts = LinuxFacts.collect().unwrap();
        assert!(facts.kernel_version.is_some());
    }
}
