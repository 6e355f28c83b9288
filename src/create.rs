//! The `create` pipeline: clone a VM, boot it, wait for SSH, bootstrap it.
//!
//! Every step is awaited before the next starts and the first failure aborts
//! the run. Nothing is rolled back: a failed clone leaves its directory behind.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::sync::watch;

use crate::backend::Hypervisor;
use crate::bootstrap::Bootstrapper;
use crate::config::{CreateConfig, ProvisionMode};
use crate::error::WsfusionError;
use crate::locate::HypervisorLayout;
use crate::logging::DeferredFileHandle;
use crate::paths;
use crate::probe::Prober;
use crate::progress::{OutputMode, Step, StepProgress};
use crate::vmx;

/// Tools states that let vmrun talk to the guest.
const TOOLS_READY: &[&str] = &["installed", "running"];

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOutcome {
    pub vmx: PathBuf,
    pub ip: String,
    pub bootstrapped: bool,
}

pub struct Provisioner<'a, H, P, B> {
    config: &'a CreateConfig,
    layout: &'a dyn HypervisorLayout,
    hypervisor: &'a H,
    prober: &'a P,
    bootstrapper: &'a B,
    log_handle: Option<DeferredFileHandle>,
    shutdown: Option<watch::Receiver<bool>>,
    mode: OutputMode,
}

impl<'a, H, P, B> Provisioner<'a, H, P, B>
where
    H: Hypervisor,
    P: Prober,
    B: Bootstrapper,
{
    pub fn new(
        config: &'a CreateConfig,
        layout: &'a dyn HypervisorLayout,
        hypervisor: &'a H,
        prober: &'a P,
        bootstrapper: &'a B,
        mode: OutputMode,
    ) -> Self {
        Self {
            config,
            layout,
            hypervisor,
            prober,
            bootstrapper,
            log_handle: None,
            shutdown: None,
            mode,
        }
    }

    /// Start writing the log into the new VM's directory once it exists.
    pub fn with_log(mut self, handle: DeferredFileHandle) -> Self {
        self.log_handle = Some(handle);
        self
    }

    /// Abort with [`WsfusionError::Interrupted`] once `shutdown` turns true.
    /// Without it the run cannot be interrupted.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn total_steps(&self) -> usize {
        match self.config.mode {
            ProvisionMode::Client => 8,
            ProvisionMode::Solo => 7,
        }
    }

    pub async fn run(&self) -> Result<CreateOutcome, WsfusionError> {
        let cfg = self.config;
        let mut progress = StepProgress::new(self.total_steps(), self.mode);

        let step = progress.begin("Locating source VM...");
        let src_vmx = vmx::resolve(&cfg.source_path).ok_or_else(|| WsfusionError::VmxNotFound {
            path: cfg.source_path.display().to_string(),
        })?;
        step.finish(format!("Source VM {}", src_vmx.display()));

        let step = progress.begin("Creating VM directory...");
        let vms_dir = paths::vms_dir(&src_vmx).ok_or(WsfusionError::NoPlacement)?;
        let dest_dir = vms_dir.join(self.layout.vm_dir_name(&cfg.vm_name));
        create_vm_dir(&dest_dir).await?;
        let log = paths::log_path(&dest_dir);
        self.activate_log(&log);
        step.finish(format!("Created {}", dest_dir.display()));

        let step = progress.begin("Checking VMware Tools in the source VM...");
        let tools_state = self.interruptible(self.hypervisor.tools_state(&src_vmx)).await?;
        if !TOOLS_READY.contains(&tools_state.as_str()) {
            return Err(WsfusionError::ToolsNotInstalled { state: tools_state });
        }
        step.finish(format!("VMware Tools {tools_state}"));

        let dest_vmx = paths::dest_vmx_path(&dest_dir, &cfg.vm_name);
        let step = progress.begin(&format!(
            "Creating VM {} from {}...",
            cfg.vm_name,
            cfg.source_path.display()
        ));
        let cloned = self
            .interruptible(self.hypervisor.clone_vm(
                &src_vmx,
                &dest_vmx,
                cfg.clone_type,
                cfg.snapshot.as_deref(),
            ))
            .await?;
        if !cloned {
            return Err(WsfusionError::CloneFailed {
                log: log.display().to_string(),
            });
        }
        set_display_name(&dest_vmx, &cfg.vm_name);
        step.finish(format!("Created {} ({} clone)", cfg.vm_name, cfg.clone_type));

        let step = progress.begin("Powering on the new VM...");
        if !self.interruptible(self.hypervisor.power_on(&dest_vmx)).await? {
            return Err(WsfusionError::PowerOnFailed {
                log: log.display().to_string(),
            });
        }
        step.finish("Powered on");

        let step = progress.begin("Waiting for an IP address from the guest...");
        let ip = self.interruptible(self.hypervisor.guest_ip(&dest_vmx)).await?;
        if ip.is_empty() {
            return Err(WsfusionError::NoGuestIp {
                vmx: dest_vmx.display().to_string(),
                log: log.display().to_string(),
            });
        }
        step.finish(format!("Guest IP {ip}"));

        let step = progress.begin("Waiting for sshd...");
        self.wait_for_ssh(&ip, &step).await?;
        step.finish("Waiting for sshd... done");

        let bootstrapped = match cfg.mode {
            ProvisionMode::Solo => false,
            ProvisionMode::Client => {
                let step = progress.begin("Bootstrapping VM");
                let params = cfg.bootstrap_params(&ip);
                self.interruptible(self.bootstrapper.bootstrap(&params))
                    .await??;
                step.finish(format!("Bootstrapped node {}", params.node_name));
                true
            }
        };

        Ok(CreateOutcome {
            vmx: dest_vmx,
            ip,
            bootstrapped,
        })
    }

    /// Probe until sshd answers. There is no attempt limit or backoff growth;
    /// only the optional deadline or a shutdown ends an unreachable wait.
    async fn wait_for_ssh(&self, ip: &str, step: &Step) -> Result<(), WsfusionError> {
        let port = self.config.ssh.port;
        let timeout = self.config.ssh_wait_timeout;
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let ready = self
                .interruptible(self.prober.probe(ip, port, || {
                    step.log(&format!("connected to sshd on {ip}"))
                }))
                .await??;
            if ready {
                break;
            }

            step.tick();
            if let (Some(deadline), Some(timeout)) = (deadline, timeout)
                && tokio::time::Instant::now() >= deadline
            {
                return Err(WsfusionError::SshTimeout {
                    host: ip.to_string(),
                    port,
                    secs: timeout.as_secs(),
                });
            }
        }

        tracing::info!(ip, port, attempts = step.attempts() + 1, "sshd reachable");
        self.interruptible(tokio::time::sleep(self.config.ssh_settle_delay))
            .await
    }

    async fn interruptible<T>(&self, fut: impl Future<Output = T>) -> Result<T, WsfusionError> {
        tokio::select! {
            out = fut => Ok(out),
            _ = shutdown_requested(self.shutdown.clone()) => {
                tracing::warn!("interrupted");
                Err(WsfusionError::Interrupted)
            }
        }
    }

    fn activate_log(&self, log: &Path) {
        if let Some(handle) = &self.log_handle
            && let Err(e) = handle.set_file(log)
        {
            tracing::warn!("unable to write log to {}: {e}", log.display());
        }
    }
}

/// Resolves once shutdown is signalled; never without a receiver or once the
/// sender is gone.
async fn shutdown_requested(shutdown: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = shutdown
        && rx.wait_for(|&stop| stop).await.is_ok()
    {
        return;
    }
    std::future::pending::<()>().await
}

async fn create_vm_dir(path: &Path) -> Result<(), WsfusionError> {
    let mut builder = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(0o755);
    builder
        .create(path)
        .await
        .map_err(|source| WsfusionError::DestinationDir {
            path: path.display().to_string(),
            source,
        })?;
    tracing::info!(path = %path.display(), "created VM directory");
    Ok(())
}

/// vmrun names the clone after its source; rename it after the new VM.
fn set_display_name(dest_vmx: &Path, vm_name: &str) {
    if !dest_vmx.is_file() {
        tracing::debug!(vmx = %dest_vmx.display(), "clone has no vmx on disk, keeping display name");
        return;
    }
    if let Err(e) = vmx::set_variable(dest_vmx, "displayName", vm_name) {
        tracing::warn!("unable to set display name: {e}");
    }
}
