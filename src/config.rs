use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, time::Duration};

/// Default grace period between the forwarded interrupt and a hard kill.
pub const DEFAULT_KILL_GRACE_SECONDS: u64 = 10;

/// Default TCP connect timeout for resource downloads.
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Directory downloaded resources are written to. The files themselves are the cache.
    pub target_dir: PathBuf,
    /// Runtime used to run the entry point.
    pub java_command: String,
    /// Extra runtime options (e.g. `-Xmx512m`), placed before the classpath.
    #[serde(default)]
    pub runtime_args: Vec<String>,
    /// Tool used to verify artifact signatures.
    pub verifier_command: String,
    /// Whether artifacts are verified at all.
    pub verify: bool,
    /// Launch even when verification fails or cannot run.
    pub trust: bool,
    pub connect_timeout: Duration,
    pub kill_grace: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            target_dir: env::var("WEBSTART_CACHE_DIR")
                .map(PathBuf::from)
                .or_else(|_| env::current_dir())
                .unwrap_or_else(|_| PathBuf::from(".")),
            java_command: env::var("WEBSTART_JAVA").unwrap_or_else(|_| "java".to_string()),
            runtime_args: Vec::new(),
            verifier_command: env::var("WEBSTART_JARSIGNER")
                .unwrap_or_else(|_| "jarsigner".to_string()),
            verify: true,
            trust: false,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            kill_grace: Duration::from_secs(DEFAULT_KILL_GRACE_SECONDS),
        }
    }
}

impl LauncherConfig {
    pub fn with_target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = dir.into();
        self
    }

    pub fn with_trust(mut self, trust: bool) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_java_command(mut self, command: impl Into<String>) -> Self {
        self.java_command = command.into();
        self
    }

    pub fn with_runtime_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.runtime_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Build the HTTP client used for descriptor and resource downloads.
    pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(concat!("webstart-launcher/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }
}
