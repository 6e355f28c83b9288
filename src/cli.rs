use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::backend::CloneType;

#[derive(Parser, Debug)]
#[command(
    name = "wsfusion",
    about = "Provision VMware Workstation/Fusion VMs and bootstrap them with Chef"
)]
pub struct Cli {
    /// Path to settings file [default: ~/.config/wsfusion/config.toml]
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Clone a VM, power it on and bootstrap it
    Create(CreateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Path to the VM used for cloning (its directory or its .vmx)
    #[arg(long, value_name = "PATH")]
    pub vm_source_path: PathBuf,

    /// Name of the new VM
    #[arg(long, value_name = "NAME")]
    pub vm_name: String,

    /// The type of clone to make
    #[arg(long, value_enum, default_value_t = CloneType::Linked)]
    pub clone_type: CloneType,

    /// The name of the snapshot of the source VM to clone
    #[arg(long, value_name = "NAME")]
    pub clone_snapshot_name: Option<String>,

    /// The ssh username
    #[arg(short = 'x', long, default_value = "root")]
    pub ssh_user: String,

    /// The ssh password
    #[arg(short = 'P', long)]
    pub ssh_password: Option<String>,

    /// The ssh port [default: 22]
    #[arg(short = 'p', long)]
    pub ssh_port: Option<u16>,

    /// The SSH identity file used for authentication
    #[arg(short = 'i', long)]
    pub identity_file: Option<PathBuf>,

    /// Comma-separated list of roles/recipes to apply
    #[arg(short = 'r', long)]
    pub run_list: Option<String>,

    /// The Chef node name for the new node [default: the VM name]
    #[arg(short = 'N', long)]
    pub node_name: Option<String>,

    /// Full path to the bootstrap template to use
    #[arg(long, value_name = "TEMPLATE")]
    pub template_file: Option<PathBuf>,

    /// Bootstrap a distro using a template
    #[arg(short = 'd', long)]
    pub distro: Option<String>,

    /// The Chef environment for the new node
    #[arg(short = 'E', long)]
    pub environment: Option<String>,

    /// A JSON string to be added to the first run of chef-client
    #[arg(short = 'j', long, value_name = "JSON", value_parser = parse_json)]
    pub json_attributes: Option<serde_json::Value>,

    /// The version of Chef to install
    #[arg(long, value_name = "VERSION")]
    pub bootstrap_version: Option<String>,

    /// Use Chef Solo instead of Chef Server (skips the bootstrap)
    #[arg(long)]
    pub chef_solo: bool,

    /// Custom path to vmrun
    #[arg(long, value_name = "PATH")]
    pub vmrun_path: Option<PathBuf>,

    /// Custom path to knife
    #[arg(long, value_name = "PATH")]
    pub knife_path: Option<PathBuf>,

    /// Disable host key verification during bootstrap
    #[arg(long)]
    pub no_host_key_verify: bool,

    /// The encrypted data bag secret
    #[arg(long)]
    pub secret: Option<String>,

    /// A file containing the encrypted data bag secret
    #[arg(long, value_name = "PATH")]
    pub secret_file: Option<PathBuf>,

    /// Give up waiting for sshd after this many seconds [default: wait forever]
    #[arg(long, value_name = "SECS")]
    pub ssh_timeout: Option<u64>,
}

fn parse_json(s: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {e}"))
}

/// Split a run list on commas and whitespace: `"role[a], recipe[b]"` →
/// `["role[a]", "recipe[b]"]`.
pub fn parse_run_list(s: &str) -> Vec<String> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
