use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum WsfusionError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to locate vmrun")]
    #[diagnostic(help("put vmrun on PATH or pass --vmrun-path"))]
    VmrunNotFound,

    #[error("No VM was found at {path}")]
    VmxNotFound { path: String },

    #[error("Unable to find a place to create the new VM")]
    NoPlacement,

    #[error("Unable to create the VM directory {path}")]
    DestinationDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("The source VM doesn't appear to have VMware Tools installed")]
    #[diagnostic(help("vmrun reported tools state '{state}'"))]
    ToolsNotInstalled { state: String },

    #[error("Unable to clone the VM. See the log for details.")]
    #[diagnostic(help("vmrun output was logged to {log}"))]
    CloneFailed { log: String },

    #[error("Unable to power on the VM. See the log for details.")]
    #[diagnostic(help("vmrun output was logged to {log}"))]
    PowerOnFailed { log: String },

    #[error("SSH probe of {host}:{port} failed")]
    Probe {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("sshd on {host}:{port} did not become reachable within {secs}s")]
    SshTimeout { host: String, port: u16, secs: u64 },

    #[error("The guest did not report an IP address")]
    #[diagnostic(help("check that {vmx} booted with VMware Tools running; vmrun output was logged to {log}"))]
    NoGuestIp { vmx: String, log: String },

    #[error("interrupted by Ctrl-C")]
    Interrupted,

    #[error("bootstrap of {host} failed: {message}")]
    Bootstrap { host: String, message: String },
}
