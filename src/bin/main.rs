use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;
use webstart_launcher::{
    JnlpReader, LaunchError, Launcher, LauncherConfig, LogProgress, ProcessIo, read_descriptor,
};

/// Exit status for command line usage errors.
const EXIT_USAGE: u8 = 64;
/// Exit status when the launch fails before or while starting the application.
const EXIT_LAUNCH_FAILED: u8 = 2;
/// Exit status on abort or an unexpected internal failure.
const EXIT_FATAL: u8 = 1;

#[derive(Parser)]
#[command(name = "webstart")]
#[command(about = "Download, verify and run a JNLP application", version)]
struct Cli {
    /// Descriptor location: an http(s) or file URL, or a local path
    descriptor: String,
    /// Launch even if artifacts are unsigned or cannot be verified
    #[arg(long)]
    trust: bool,
    /// Skip signature verification entirely
    #[arg(long)]
    no_verify: bool,
    /// Directory resources are downloaded to and reused from
    #[arg(long, env = "WEBSTART_CACHE_DIR")]
    target_dir: Option<PathBuf>,
    /// Runtime command used to start the application
    #[arg(long, env = "WEBSTART_JAVA")]
    java: Option<String>,
    /// Extra runtime option, e.g. `--jvm-arg=-Xmx512m` (repeatable)
    #[arg(long = "jvm-arg", allow_hyphen_values = true)]
    jvm_args: Vec<String>,
    /// Print the parsed descriptor as JSON and exit
    #[arg(long)]
    describe: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let usage = e.use_stderr();
            let _ = e.print();
            return if usage {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialise logging: {:#}", e);
        return ExitCode::from(EXIT_FATAL);
    }

    let location = match descriptor_url(&cli.descriptor) {
        Ok(location) => location,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match launch(cli, location).await {
        Ok(code) => exit_code(code),
        Err(e) => {
            let status = match e.downcast_ref::<LaunchError>() {
                Some(LaunchError::Aborted) | Some(LaunchError::Internal(_)) => EXIT_FATAL,
                Some(_) => EXIT_LAUNCH_FAILED,
                None => EXIT_FATAL,
            };
            error!("{:#}", e);
            ExitCode::from(status)
        }
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("webstart_launcher=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn launch(cli: Cli, location: Url) -> Result<i32> {
    let mut config = LauncherConfig::default()
        .with_trust(cli.trust)
        .with_verify(!cli.no_verify)
        .with_runtime_args(cli.jvm_args);
    if let Some(dir) = cli.target_dir {
        config = config.with_target_dir(dir);
    }
    if let Some(java) = cli.java {
        config = config.with_java_command(java);
    }
    if config.trust {
        warn!("Trust override enabled: unverified artifacts will be launched");
    }

    let stop = CancellationToken::new();
    let signals = tokio::spawn(forward_stop_signals(stop.clone()));
    let result = run_descriptor(cli.describe, config, &location, stop).await;
    signals.abort();
    result
}

async fn run_descriptor(
    describe: bool,
    config: LauncherConfig,
    location: &Url,
    stop: CancellationToken,
) -> Result<i32> {
    let client = config.http_client()?;
    let reader = JnlpReader::new();
    let descriptor = tokio::select! {
        biased;
        _ = stop.cancelled() => return Err(LaunchError::Aborted.into()),
        descriptor = read_descriptor(&reader, &client, location) => descriptor?,
    };

    if describe {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
        return Ok(0);
    }

    let launcher = Launcher::new(descriptor, config)?
        .with_client(client)
        .with_progress(Arc::new(LogProgress))
        .with_cancellation(stop);

    let descriptor = launcher.descriptor();
    info!(
        "Launching {} by {} ({})",
        descriptor.title.as_deref().unwrap_or("untitled application"),
        descriptor.vendor.as_deref().unwrap_or("unknown vendor"),
        descriptor.homepage.as_deref().unwrap_or("no homepage"),
    );

    Ok(launcher.run(ProcessIo::inherit()).await?)
}

/// Accept URLs as-is and turn anything else into a `file://` URL.
fn descriptor_url(raw: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(raw) {
        // Single letters are Windows drive prefixes, not schemes.
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }
    let path = std::path::absolute(raw)
        .with_context(|| format!("cannot resolve descriptor path `{}`", raw))?;
    Url::from_file_path(&path)
        .map_err(|_| anyhow::anyhow!("invalid descriptor location `{}`", raw))
}

async fn forward_stop_signals(stop: CancellationToken) {
    wait_for_stop_signal().await;
    info!("Stop requested, shutting down");
    stop.cancel();
}

#[cfg(unix)]
async fn wait_for_stop_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Exit statuses outside 0..=255 are reported modulo 256, as a shell would.
fn exit_code(code: i32) -> ExitCode {
    ExitCode::from((code & 0xff) as u8)
}
