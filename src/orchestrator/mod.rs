//! Launch orchestration: fetch every resource, verify them, then run the
//! entry point and report its exit code.
//!
//! A [`Launcher`] runs once. Its progress is a small state machine:
//!
//! ```text
//! Created -> ResourcesFetching -> Verifying -> Running -> Terminated
//!                    \________________\____________\----> Aborted
//! ```
//!
//! Any other error ends in `Failed`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LauncherConfig;
use crate::descriptor::{LaunchDescriptor, RuntimeProperty};
use crate::error::{LaunchError, LaunchResult};
use crate::fetch::{DownloadProgress, NoProgress, ResourceFetcher};
use crate::process::{Execution, ProcessIo, ProcessSupervisor, Signal};
use crate::verify::{JarSigner, Verifier, verify_all};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchState {
    Created,
    ResourcesFetching,
    Verifying,
    Running,
    Terminated,
    Aborted,
    Failed,
}

impl LaunchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Aborted | Self::Failed)
    }
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::ResourcesFetching => "fetching resources",
            Self::Verifying => "verifying",
            Self::Running => "running",
            Self::Terminated => "terminated",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runs one launch descriptor end to end.
pub struct Launcher {
    descriptor: LaunchDescriptor,
    config: LauncherConfig,
    client: Client,
    verifier: Option<Arc<dyn Verifier>>,
    progress: Arc<dyn DownloadProgress>,
    cancel: CancellationToken,
    state: watch::Sender<LaunchState>,
}

impl Launcher {
    /// Create a launcher. Verification uses `jarsigner` unless the
    /// configuration disables it.
    pub fn new(descriptor: LaunchDescriptor, config: LauncherConfig) -> LaunchResult<Self> {
        let client = config.http_client()?;
        let verifier = config.verify.then(|| {
            Arc::new(JarSigner::new(config.verifier_command.clone())) as Arc<dyn Verifier>
        });
        let (state, _) = watch::channel(LaunchState::Created);

        Ok(Self {
            descriptor,
            config,
            client,
            verifier,
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
            state,
        })
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn without_verifier(mut self) -> Self {
        self.verifier = None;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn DownloadProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Use an externally owned stop token instead of a private one.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn descriptor(&self) -> &LaunchDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> LaunchState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LaunchState> {
        self.state.subscribe()
    }

    /// Token that stops the launch when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a stop. The active phase is cancelled and `run` fails with
    /// [`LaunchError::Aborted`].
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Run the launch and return the child's exit code.
    ///
    /// May only be called once per launcher.
    pub async fn run(&self, io: ProcessIo) -> LaunchResult<i32> {
        let plan = self.entry_point();

        let mut claimed = false;
        self.state.send_if_modified(|state| {
            if *state != LaunchState::Created {
                return false;
            }
            *state = if plan.is_ok() {
                LaunchState::ResourcesFetching
            } else {
                LaunchState::Failed
            };
            claimed = true;
            true
        });
        if !claimed {
            return Err(LaunchError::Configuration(format!(
                "launch already started (state: {})",
                self.state()
            )));
        }
        let entry_point = plan?;

        let result = self.pipeline(entry_point, io).await;

        let terminal = match &result {
            Ok(_) => LaunchState::Terminated,
            Err(LaunchError::Aborted) => LaunchState::Aborted,
            Err(_) => LaunchState::Failed,
        };
        self.transition(terminal);
        result
    }

    fn entry_point(&self) -> LaunchResult<&str> {
        if self.descriptor.resources.is_empty() {
            return Err(LaunchError::Configuration(
                "descriptor names no resources".to_string(),
            ));
        }
        self.descriptor
            .entry_point
            .as_deref()
            .ok_or_else(|| LaunchError::Configuration("no main class specified".to_string()))
    }

    fn transition(&self, next: LaunchState) {
        debug!("Launch state: {}", next);
        self.state.send_replace(next);
    }

    async fn pipeline(&self, entry_point: &str, io: ProcessIo) -> LaunchResult<i32> {
        let target_dir = &self.config.target_dir;
        info!(
            "Fetching {} resource(s) into {}",
            self.descriptor.resources.len(),
            target_dir.display()
        );
        let fetcher = ResourceFetcher::new(self.client.clone(), self.cancel.clone())
            .with_progress(self.progress.clone());
        let artifacts = fetcher
            .fetch_all(&self.descriptor.resources, target_dir)
            .await?;

        self.transition(LaunchState::Verifying);
        match &self.verifier {
            Some(verifier) => {
                verify_all(verifier.as_ref(), &artifacts, self.config.trust, &self.cancel).await?
            }
            None => debug!("Artifact verification disabled"),
        }
        if self.cancel.is_cancelled() {
            return Err(LaunchError::Aborted);
        }

        self.transition(LaunchState::Running);
        info!(
            "Starting {}...",
            self.descriptor.title.as_deref().unwrap_or(entry_point)
        );
        let paths: Vec<&Path> = artifacts.iter().map(|a| a.local_path.as_path()).collect();
        let execution = self.supervisor().spawn(entry_point, &paths, io)?;

        self.supervise(execution).await
    }

    fn supervisor(&self) -> ProcessSupervisor {
        ProcessSupervisor::new(self.config.java_command.clone())
            .with_runtime_args(self.config.runtime_args.iter().cloned())
            .with_runtime_args(self.descriptor.properties.iter().map(RuntimeProperty::to_arg))
            .with_app_args(self.descriptor.arguments.iter().cloned())
    }

    /// Wait for the child, forwarding a stop request as an interrupt and
    /// escalating to a kill after the grace period.
    async fn supervise(&self, execution: Execution) -> LaunchResult<i32> {
        tokio::select! {
            biased;
            result = execution.wait() => return result,
            _ = self.cancel.cancelled() => {}
        }

        info!("Stop requested, interrupting child process");
        execution.abort(Signal::Interrupt);

        let grace = self.config.kill_grace;
        if tokio::time::timeout(grace, execution.wait()).await.is_err() {
            warn!("Child still running {:?} after interrupt, killing it", grace);
            execution.abort(Signal::Kill);
            if let Err(e) = execution.wait().await {
                warn!("Child did not report an exit status: {}", e);
            }
        }

        Err(LaunchError::Aborted)
    }
}
