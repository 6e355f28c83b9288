//! Handing a freshly booted guest to `knife bootstrap`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::WsfusionError;

/// Everything the bootstrap needs to enrol one node.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapParams {
    pub host: String,
    pub run_list: Vec<String>,
    pub node_name: String,
    pub first_boot_attributes: serde_json::Value,
    pub bootstrap_version: Option<String>,
    pub distro: Option<String>,
    pub template_file: Option<PathBuf>,
    pub environment: Option<String>,
    pub ssh_user: String,
    pub ssh_password: Option<String>,
    pub ssh_port: u16,
    pub use_sudo: bool,
    pub identity_file: Option<PathBuf>,
    pub no_host_key_verify: bool,
    pub encrypted_data_bag_secret: Option<String>,
    pub encrypted_data_bag_secret_file: Option<PathBuf>,
}

impl BootstrapParams {
    /// Arguments for `knife`, starting with the `bootstrap` subcommand.
    pub fn knife_args(&self) -> Vec<String> {
        self.args(false)
    }

    /// Same as [`knife_args`](Self::knife_args) with credentials masked, for logging.
    pub fn redacted_args(&self) -> Vec<String> {
        self.args(true)
    }

    fn args(&self, redact: bool) -> Vec<String> {
        let secret = |value: &str| {
            if redact {
                "********".to_string()
            } else {
                value.to_string()
            }
        };

        let mut args = vec!["bootstrap".to_string(), self.host.clone()];
        let mut opt = |flag: &str, value: String| {
            args.push(flag.to_string());
            args.push(value);
        };

        if !self.run_list.is_empty() {
            opt("--run-list", self.run_list.join(","));
        }
        opt("--node-name", self.node_name.clone());
        opt("--json-attributes", self.first_boot_attributes.to_string());
        if let Some(v) = &self.bootstrap_version {
            opt("--bootstrap-version", v.clone());
        }
        if let Some(d) = &self.distro {
            opt("--distro", d.clone());
        }
        if let Some(t) = &self.template_file {
            opt("--template-file", t.display().to_string());
        }
        if let Some(e) = &self.environment {
            opt("--environment", e.clone());
        }
        opt("--ssh-user", self.ssh_user.clone());
        if let Some(p) = &self.ssh_password {
            opt("--ssh-password", secret(p));
        }
        opt("--ssh-port", self.ssh_port.to_string());
        if let Some(i) = &self.identity_file {
            opt("--identity-file", i.display().to_string());
        }
        if let Some(s) = &self.encrypted_data_bag_secret {
            opt("--secret", secret(s));
        }
        if let Some(f) = &self.encrypted_data_bag_secret_file {
            opt("--secret-file", f.display().to_string());
        }

        if self.use_sudo {
            args.push("--sudo".into());
        }
        if self.no_host_key_verify {
            args.push("--no-host-key-verify".into());
        }
        args
    }
}

#[allow(async_fn_in_trait)] // trait is internal-only
pub trait Bootstrapper {
    /// Run the bootstrap to completion.
    async fn bootstrap(&self, params: &BootstrapParams) -> Result<(), WsfusionError>;
}

/// Runs `knife bootstrap` with the terminal attached, so its output reaches
/// the user as it happens.
pub struct KnifeBootstrap {
    knife: PathBuf,
}

impl KnifeBootstrap {
    pub fn new(knife: PathBuf) -> Self {
        Self { knife }
    }

    pub fn knife(&self) -> &Path {
        &self.knife
    }
}

impl Bootstrapper for KnifeBootstrap {
    async fn bootstrap(&self, params: &BootstrapParams) -> Result<(), WsfusionError> {
        tracing::info!(
            "running {} {}",
            self.knife.display(),
            params.redacted_args().join(" ")
        );

        let status = tokio::process::Command::new(&self.knife)
            .args(params.knife_args())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| WsfusionError::Spawn {
                command: self.knife.display().to_string(),
                source,
            })?;

        if !status.success() {
            return Err(WsfusionError::Bootstrap {
                host: params.host.clone(),
                message: format!("{} exited with {status}", self.knife.display()),
            });
        }

        tracing::info!(host = %params.host, node = %params.node_name, "bootstrap complete");
        Ok(())
    }
}
