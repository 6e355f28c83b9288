use std::path::{Path, PathBuf};

use super::{CloneType, Hypervisor};
use crate::runner::{self, CommandOutput};

/// Drives VMware Workstation / Fusion through the `vmrun` executable.
pub struct Vmrun {
    path: PathBuf,
}

impl Vmrun {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run(&self, args: Vec<String>) -> Option<CommandOutput> {
        match runner::run(&self.path, &args).await {
            Ok(output) => Some(output),
            Err(e) => {
                tracing::error!(error = ?e, "vmrun could not be run");
                None
            }
        }
    }
}

pub fn clone_args(
    src_vmx: &Path,
    dest_vmx: &Path,
    clone_type: CloneType,
    snapshot: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        "clone".to_string(),
        src_vmx.display().to_string(),
        dest_vmx.display().to_string(),
        clone_type.to_string(),
    ];
    if let Some(name) = snapshot {
        args.push(format!("-snapshot={name}"));
    }
    args
}

pub fn start_args(vmx: &Path) -> Vec<String> {
    vec!["start".into(), vmx.display().to_string(), "nogui".into()]
}

pub fn tools_state_args(vmx: &Path) -> Vec<String> {
    vec!["checkToolsState".into(), vmx.display().to_string()]
}

pub fn guest_ip_args(vmx: &Path) -> Vec<String> {
    vec![
        "getGuestIPAddress".into(),
        vmx.display().to_string(),
        "-wait".into(),
    ]
}

impl Hypervisor for Vmrun {
    async fn clone_vm(
        &self,
        src_vmx: &Path,
        dest_vmx: &Path,
        clone_type: CloneType,
        snapshot: Option<&str>,
    ) -> bool {
        self.run(clone_args(src_vmx, dest_vmx, clone_type, snapshot))
            .await
            .is_some_and(|out| out.success())
    }

    async fn power_on(&self, vmx: &Path) -> bool {
        self.run(start_args(vmx))
            .await
            .is_some_and(|out| out.success())
    }

    async fn tools_state(&self, vmx: &Path) -> String {
        self.run(tools_state_args(vmx))
            .await
            .map(|out| out.stdout.trim().to_string())
            .unwrap_or_default()
    }

    async fn guest_ip(&self, vmx: &Path) -> String {
        match self.run(guest_ip_args(vmx)).await {
            Some(out) if out.success() => out.stdout.trim().to_string(),
            _ => String::new(),
        }
    }
}
