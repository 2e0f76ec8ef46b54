//! Supervision of the launched child runtime.
//!
//! [`ProcessSupervisor::spawn`] starts the child and returns an [`Execution`]
//! right away. A monitor task owns the child: it forwards abort signals,
//! waits for the exit status, then unwires the stdio pumps before publishing
//! the result.

pub mod buffer;

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{LaunchError, LaunchResult};

pub use buffer::OutputBuffer;

/// Separator between classpath entries on this platform.
#[cfg(windows)]
pub const CLASSPATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const CLASSPATH_SEPARATOR: char = ':';

/// Join resource paths into one classpath argument, keeping their order.
pub fn classpath<I, P>(paths: I) -> LaunchResult<OsString>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let paths: Vec<_> = paths.into_iter().collect();
    if paths.is_empty() {
        return Err(LaunchError::Configuration("empty classpath".to_string()));
    }
    std::env::join_paths(paths.iter().map(|p| p.as_ref()))
        .map_err(|e| LaunchError::Configuration(format!("cannot build classpath: {}", e)))
}

/// Signal sent to the child on abort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Signal {
    /// Graceful interrupt (SIGINT).
    #[default]
    Interrupt,
    /// Termination request (SIGTERM).
    Terminate,
    /// Forced kill (SIGKILL).
    Kill,
}

#[cfg(unix)]
impl Signal {
    fn as_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal as Nix;
        match self {
            Signal::Interrupt => Nix::SIGINT,
            Signal::Terminate => Nix::SIGTERM,
            Signal::Kill => Nix::SIGKILL,
        }
    }
}

pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;
pub type InputSource = Box<dyn AsyncRead + Send + Unpin>;

/// Where the child's standard streams go.
///
/// A stream left as `None` is inherited from this process and is never
/// closed by the supervisor. Provided sinks are shut down once the child
/// has exited and its output is drained.
#[derive(Default)]
pub struct ProcessIo {
    pub stdout: Option<OutputSink>,
    pub stderr: Option<OutputSink>,
    pub stdin: Option<InputSource>,
}

impl ProcessIo {
    /// Inherit all three standard streams.
    pub fn inherit() -> Self {
        Self::default()
    }

    pub fn with_stdout(mut self, sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(sink));
        self
    }

    pub fn with_stderr(mut self, sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(sink));
        self
    }

    pub fn with_stdin(mut self, source: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(source));
        self
    }
}

fn stdio_for<T>(stream: &Option<T>) -> Stdio {
    if stream.is_some() {
        Stdio::piped()
    } else {
        Stdio::inherit()
    }
}

/// Spawns `program [runtime args] -cp <classpath> <entry point> [app args]`.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    program: String,
    runtime_args: Vec<String>,
    app_args: Vec<String>,
}

impl ProcessSupervisor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            runtime_args: Vec::new(),
            app_args: Vec::new(),
        }
    }

    /// Arguments for the runtime itself, placed before the classpath.
    pub fn with_runtime_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.runtime_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments for the application, placed after the entry point.
    pub fn with_app_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.app_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list passed to the program.
    pub fn command_args(&self, entry_point: &str, classpath: &OsStr) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.runtime_args.iter().map(OsString::from).collect();
        args.push("-cp".into());
        args.push(classpath.to_os_string());
        args.push(entry_point.into());
        args.extend(self.app_args.iter().map(OsString::from));
        args
    }

    /// Start the child. Fails immediately if the program cannot be spawned.
    pub fn spawn<P: AsRef<Path>>(
        &self,
        entry_point: &str,
        resource_paths: &[P],
        io: ProcessIo,
    ) -> LaunchResult<Execution> {
        let classpath = classpath(resource_paths)?;
        let args = self.command_args(entry_point, &classpath);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(stdio_for(&io.stdin))
            .stdout(stdio_for(&io.stdout))
            .stderr(stdio_for(&io.stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LaunchError::ProcessSpawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let pid = child.id();
        info!("Started {} (pid {:?}) running {}", self.program, pid, entry_point);

        let pumps = Pumps::wire(&mut child, io);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        tokio::spawn(supervise(child, signal_rx, pumps, outcome_tx));

        Ok(Execution {
            pid,
            aborter: ExecutionAborter { signals: signal_tx },
            outcome: outcome_rx,
        })
    }
}

/// Copy tasks between the child's pipes and caller-supplied streams.
struct Pumps {
    stdout: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<()>>,
    stdin: Option<JoinHandle<()>>,
}

impl Pumps {
    fn wire(child: &mut Child, io: ProcessIo) -> Self {
        let stdout = match (child.stdout.take(), io.stdout) {
            (Some(pipe), Some(sink)) => Some(tokio::spawn(pump_output(pipe, sink, "stdout"))),
            _ => None,
        };
        let stderr = match (child.stderr.take(), io.stderr) {
            (Some(pipe), Some(sink)) => Some(tokio::spawn(pump_output(pipe, sink, "stderr"))),
            _ => None,
        };
        let stdin = match (child.stdin.take(), io.stdin) {
            (Some(mut pipe), Some(mut source)) => Some(tokio::spawn(async move {
                if let Err(e) = tokio::io::copy(&mut source, &mut pipe).await {
                    debug!("Forwarding stdin stopped: {}", e);
                }
            })),
            _ => None,
        };
        Self {
            stdout,
            stderr,
            stdin,
        }
    }

    /// Drain the output pumps and stop feeding stdin.
    async fn unwire(self) {
        if let Some(stdin) = self.stdin {
            stdin.abort();
        }
        for pump in [self.stdout, self.stderr].into_iter().flatten() {
            if let Err(e) = pump.await {
                warn!("Output forwarding task failed: {}", e);
            }
        }
    }
}

async fn pump_output<R>(mut pipe: R, mut sink: OutputSink, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    if let Err(e) = tokio::io::copy(&mut pipe, &mut sink).await {
        warn!("Forwarding child {} failed: {}", stream, e);
    }
    if let Err(e) = sink.shutdown().await {
        debug!("Closing {} sink failed: {}", stream, e);
    }
}

async fn supervise(
    mut child: Child,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    pumps: Pumps,
    outcome: watch::Sender<Option<LaunchResult<i32>>>,
) {
    let mut owned = true;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            signal = signals.recv(), if owned => match signal {
                Some(signal) => deliver(&mut child, signal),
                None => {
                    // Every Execution handle is gone, nobody can stop the child later.
                    owned = false;
                    debug!("Execution dropped, killing child process");
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill orphaned child: {}", e);
                    }
                }
            },
        }
    };
    // Aborts requested from now on are no-ops.
    signals.close();

    pumps.unwire().await;

    let result = match status {
        Ok(status) => {
            info!("Process terminated ({})", status);
            // A child killed by a signal has no exit code.
            Ok(status.code().unwrap_or(0))
        }
        Err(e) => Err(LaunchError::Internal(format!(
            "cannot wait for child process: {}",
            e
        ))),
    };
    let _ = outcome.send(Some(result));
}

#[cfg(unix)]
fn deliver(child: &mut Child, signal: Signal) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    debug!("Sending {:?} to pid {}", signal, pid);
    if let Err(e) = kill(Pid::from_raw(pid as i32), signal.as_nix()) {
        warn!("Failed to signal pid {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn deliver(child: &mut Child, signal: Signal) {
    debug!("Stopping child on {:?}", signal);
    if let Err(e) = child.start_kill() {
        warn!("Failed to stop child: {}", e);
    }
}

/// Cloneable handle that can abort an [`Execution`] from another task.
#[derive(Debug, Clone)]
pub struct ExecutionAborter {
    signals: mpsc::UnboundedSender<Signal>,
}

impl ExecutionAborter {
    /// Send `signal` to the child. Returns `false` once the child has exited.
    pub fn abort(&self, signal: Signal) -> bool {
        self.signals.send(signal).is_ok()
    }
}

/// A running child process.
pub struct Execution {
    pid: Option<u32>,
    aborter: ExecutionAborter,
    outcome: watch::Receiver<Option<LaunchResult<i32>>>,
}

impl Execution {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// See [`ExecutionAborter::abort`].
    pub fn abort(&self, signal: Signal) -> bool {
        self.aborter.abort(signal)
    }

    pub fn aborter(&self) -> ExecutionAborter {
        self.aborter.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Wait for the child to exit and its streams to be drained.
    pub async fn wait(&self) -> LaunchResult<i32> {
        let mut outcome = self.outcome.clone();
        match outcome.wait_for(Option::is_some).await {
            Ok(settled) => (*settled).clone().unwrap_or_else(|| {
                Err(LaunchError::Internal("execution settled without a result".to_string()))
            }),
            Err(_) => Err(LaunchError::Internal(
                "process monitor stopped without a result".to_string(),
            )),
        }
    }
}
