pub mod vmrun;

use std::fmt;
use std::path::Path;

/// Full copies are independent of the source; linked clones share its disks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CloneType {
    Full,
    #[default]
    Linked,
}

impl fmt::Display for CloneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneType::Full => f.write_str("full"),
            CloneType::Linked => f.write_str("linked"),
        }
    }
}

/// VM lifecycle operations issued against a VMX path.
///
/// Failures are reported as `false` / empty strings; the details go to the log.
#[allow(async_fn_in_trait)] // trait is internal-only
pub trait Hypervisor {
    async fn clone_vm(
        &self,
        src_vmx: &Path,
        dest_vmx: &Path,
        clone_type: CloneType,
        snapshot: Option<&str>,
    ) -> bool;

    async fn power_on(&self, vmx: &Path) -> bool;

    /// Guest tools state as reported by the hypervisor, e.g. `installed`.
    async fn tools_state(&self, vmx: &Path) -> String;

    /// Blocks until the guest reports an address; empty on failure.
    async fn guest_ip(&self, vmx: &Path) -> String;
}
