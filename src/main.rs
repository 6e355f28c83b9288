use std::io::IsTerminal;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use wsfusion::backend::vmrun::Vmrun;
use wsfusion::bootstrap::KnifeBootstrap;
use wsfusion::cli::{Cli, Command, CreateArgs};
use wsfusion::config::{self, CreateConfig};
use wsfusion::create::Provisioner;
use wsfusion::error::WsfusionError;
use wsfusion::locate;
use wsfusion::logging::{self, DeferredFileHandle};
use wsfusion::paths;
use wsfusion::probe::TcpProber;
use wsfusion::progress::OutputMode;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    let mode = resolve_output_mode(cli.verbose, cli.quiet);

    // Terminal layer: the progress UI owns the terminal in Normal/Quiet, and
    // stray tracing lines on stderr break indicatif's redraws.
    let terminal_filter = match mode {
        OutputMode::Verbose => EnvFilter::new("debug"),
        OutputMode::Normal | OutputMode::Quiet => EnvFilter::new("off"),
        OutputMode::Plain => EnvFilter::from_default_env()
            .add_directive("wsfusion=info".parse().expect("valid log directive")),
    };

    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter);

    // File layer: always captures wsfusion=debug, discards until the VM
    // directory exists.
    let (file_writer, file_handle) = logging::DeferredFileWriter::new();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(EnvFilter::new("wsfusion=debug"));

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .init();

    let (config_path, explicit) = match &cli.config {
        Some(path) => (paths::absolutize(path), true),
        None => (paths::default_config_path(), false),
    };
    let settings = config::load_settings(&config_path, explicit)?;

    match cli.command {
        Command::Create(args) => run_create(args, settings, file_handle, mode).await?,
    }

    Ok(())
}

async fn run_create(
    args: CreateArgs,
    settings: config::Settings,
    file_handle: DeferredFileHandle,
    mode: OutputMode,
) -> Result<(), WsfusionError> {
    let config = CreateConfig::resolve(args, settings)?;

    let layout = locate::detect_layout();
    tracing::debug!(layout = layout.name(), "detected hypervisor layout");
    let vmrun_path = locate::locate_vmrun(config.vmrun_path.as_deref(), layout.as_ref())
        .ok_or(WsfusionError::VmrunNotFound)?;
    let hypervisor = Vmrun::new(vmrun_path);
    let prober = TcpProber::default();
    let bootstrapper = KnifeBootstrap::new(config.knife_path.clone());
    tracing::info!(
        vmrun = %hypervisor.path().display(),
        knife = %bootstrapper.knife().display(),
        "using external tools"
    );

    // Ctrl-C stops the run at whichever step is in flight.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let outcome = Provisioner::new(
        &config,
        layout.as_ref(),
        &hypervisor,
        &prober,
        &bootstrapper,
        mode,
    )
    .with_log(file_handle)
    .with_shutdown(shutdown_rx)
    .run()
    .await?;

    let address = if outcome.ip.is_empty() {
        "unknown address"
    } else {
        outcome.ip.as_str()
    };
    println!(
        "VM '{}' is up at {address} ({})",
        config.vm_name,
        outcome.vmx.display()
    );
    if !outcome.bootstrapped {
        tracing::info!("chef-solo mode, skipped knife bootstrap");
    }
    Ok(())
}

fn resolve_output_mode(verbose: bool, quiet: bool) -> OutputMode {
    if quiet {
        OutputMode::Quiet
    } else if verbose {
        OutputMode::Verbose
    } else if std::io::stdout().is_terminal() {
        OutputMode::Normal
    } else {
        OutputMode::Plain
    }
}
