use std::path::{Path, PathBuf};
use std::time::Duration;

use facet::Facet;

use crate::backend::CloneType;
use crate::bootstrap::BootstrapParams;
use crate::cli::{CreateArgs, parse_run_list};
use crate::error::WsfusionError;

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_KNIFE: &str = "knife";

// ── Settings file ─────────────────────────────────────────

/// Process-wide settings read from the TOML settings file. Values given on
/// the command line take precedence.
#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct Settings {
    pub vmrun_path: Option<String>,
    #[facet(default = "knife")]
    pub knife_path: String,
    /// `client` (default) or `solo`.
    pub chef_mode: Option<String>,
    pub bootstrap_version: Option<String>,
    pub distro: Option<String>,
    pub template_file: Option<String>,
    pub environment: Option<String>,
    #[facet(default)]
    pub no_host_key_verify: bool,
    pub encrypted_data_bag_secret: Option<String>,
    pub encrypted_data_bag_secret_file: Option<String>,
    pub ssh_port: Option<u16>,
    /// Pause after sshd first answers, before bootstrapping.
    #[facet(default = 10)]
    pub ssh_settle_delay_s: u64,
    /// Unset means wait for sshd indefinitely.
    pub ssh_wait_timeout_s: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vmrun_path: None,
            knife_path: DEFAULT_KNIFE.into(),
            chef_mode: None,
            bootstrap_version: None,
            distro: None,
            template_file: None,
            environment: None,
            no_host_key_verify: false,
            encrypted_data_bag_secret: None,
            encrypted_data_bag_secret_file: None,
            ssh_port: None,
            ssh_settle_delay_s: 10,
            ssh_wait_timeout_s: None,
        }
    }
}

/// Load the settings file. A missing file is only an error when the user
/// named it explicitly.
pub fn load_settings(path: &Path, explicit: bool) -> Result<Settings, WsfusionError> {
    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(Settings::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|source| WsfusionError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    parse_settings(&contents).map_err(|message| WsfusionError::ConfigParse {
        path: path.display().to_string(),
        message,
    })
}

fn parse_settings(contents: &str) -> Result<Settings, String> {
    facet_toml::from_str(contents).map_err(|e| e.to_string())
}

// ── Resolved configuration ────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionMode {
    /// Enrol the node with a Chef server via `knife bootstrap`.
    Client,
    /// No server; the bootstrap is skipped.
    Solo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SshConfig {
    pub user: String,
    pub password: Option<String>,
    pub port: u16,
    pub identity_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    pub run_list: Vec<String>,
    pub node_name: Option<String>,
    pub json_attributes: Option<serde_json::Value>,
    pub bootstrap_version: Option<String>,
    pub distro: Option<String>,
    pub template_file: Option<PathBuf>,
    pub environment: Option<String>,
    pub no_host_key_verify: bool,
    pub secret: Option<String>,
    pub secret_file: Option<PathBuf>,
}

/// Everything `create` needs, resolved once from flags and settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateConfig {
    pub source_path: PathBuf,
    pub vm_name: String,
    pub clone_type: CloneType,
    pub snapshot: Option<String>,
    pub vmrun_path: Option<PathBuf>,
    pub knife_path: PathBuf,
    pub mode: ProvisionMode,
    pub ssh: SshConfig,
    pub ssh_settle_delay: Duration,
    /// `None` waits for sshd forever.
    pub ssh_wait_timeout: Option<Duration>,
    pub bootstrap: BootstrapConfig,
}

impl CreateConfig {
    pub fn resolve(args: CreateArgs, settings: Settings) -> Result<Self, WsfusionError> {
        validate_name(&args.vm_name)?;

        let mode = if args.chef_solo {
            ProvisionMode::Solo
        } else {
            parse_mode(settings.chef_mode.as_deref())?
        };

        if let Some(attrs) = &args.json_attributes
            && !attrs.is_object()
        {
            return Err(WsfusionError::Validation {
                message: "json attributes must be a JSON object".into(),
            });
        }

        let ssh_wait_timeout_s = args.ssh_timeout.or(settings.ssh_wait_timeout_s);
        if ssh_wait_timeout_s == Some(0) {
            return Err(WsfusionError::Validation {
                message: "ssh wait timeout must be at least 1 second".into(),
            });
        }

        Ok(Self {
            source_path: args.vm_source_path,
            vm_name: args.vm_name,
            clone_type: args.clone_type,
            snapshot: args.clone_snapshot_name,
            vmrun_path: args.vmrun_path.or(settings.vmrun_path.map(PathBuf::from)),
            knife_path: args
                .knife_path
                .unwrap_or_else(|| PathBuf::from(settings.knife_path)),
            mode,
            ssh: SshConfig {
                user: args.ssh_user,
                password: args.ssh_password,
                port: args.ssh_port.or(settings.ssh_port).unwrap_or(DEFAULT_SSH_PORT),
                identity_file: args.identity_file,
            },
            ssh_settle_delay: Duration::from_secs(settings.ssh_settle_delay_s),
            ssh_wait_timeout: ssh_wait_timeout_s.map(Duration::from_secs),
            bootstrap: BootstrapConfig {
                run_list: args.run_list.as_deref().map(parse_run_list).unwrap_or_default(),
                node_name: args.node_name,
                json_attributes: args.json_attributes,
                bootstrap_version: args.bootstrap_version.or(settings.bootstrap_version),
                distro: args.distro.or(settings.distro),
                template_file: args
                    .template_file
                    .or(settings.template_file.map(PathBuf::from)),
                environment: args.environment.or(settings.environment),
                no_host_key_verify: args.no_host_key_verify || settings.no_host_key_verify,
                secret: args.secret.or(settings.encrypted_data_bag_secret),
                secret_file: args
                    .secret_file
                    .or(settings.encrypted_data_bag_secret_file.map(PathBuf::from)),
            },
        })
    }

    /// Parameters for bootstrapping the new VM reachable at `host`.
    pub fn bootstrap_params(&self, host: &str) -> BootstrapParams {
        let b = &self.bootstrap;
        BootstrapParams {
            host: host.to_string(),
            run_list: b.run_list.clone(),
            node_name: b.node_name.clone().unwrap_or_else(|| self.vm_name.clone()),
            first_boot_attributes: b
                .json_attributes
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
            bootstrap_version: b.bootstrap_version.clone(),
            distro: b.distro.clone(),
            template_file: b.template_file.clone(),
            environment: b.environment.clone(),
            ssh_user: self.ssh.user.clone(),
            ssh_password: self.ssh.password.clone(),
            ssh_port: self.ssh.port,
            use_sudo: self.ssh.user != "root",
            identity_file: self.ssh.identity_file.clone(),
            no_host_key_verify: b.no_host_key_verify,
            encrypted_data_bag_secret: b.secret.clone(),
            encrypted_data_bag_secret_file: b.secret_file.clone(),
        }
    }
}

// ── validation ────────────────────────────────────────────

fn parse_mode(mode: Option<&str>) -> Result<ProvisionMode, WsfusionError> {
    match mode {
        None | Some("client") => Ok(ProvisionMode::Client),
        Some("solo") => Ok(ProvisionMode::Solo),
        Some(other) => Err(WsfusionError::Validation {
            message: format!("chef_mode must be 'client' or 'solo' (got '{other}')"),
        }),
    }
}

/// VM names become directory and file names, so keep them to a safe set.
fn validate_name(name: &str) -> Result<(), WsfusionError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if !valid {
        return Err(WsfusionError::Validation {
            message: format!("VM name must match [a-zA-Z0-9][a-zA-Z0-9._-]* (got '{name}')"),
        });
    }
    Ok(())
}
