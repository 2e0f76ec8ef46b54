//! Artifact verification and the trust policy applied to its outcome.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{LaunchError, LaunchResult};
use crate::fetch::CachedArtifact;

/// Outcome of a verification that was able to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub trusted: bool,
}

/// Checks a downloaded artifact.
///
/// Implementations return [`LaunchError::VerificationUnavailable`] when the
/// check itself cannot run, and `Ok` with `trusted: false` when it ran and
/// rejected the artifact.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, artifact: &Path) -> LaunchResult<Verification>;
}

/// Verifies jar signatures with `jarsigner -verify`.
#[derive(Debug, Clone)]
pub struct JarSigner {
    command: String,
}

impl JarSigner {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for JarSigner {
    fn default() -> Self {
        Self::new("jarsigner")
    }
}

#[async_trait]
impl Verifier for JarSigner {
    async fn verify(&self, artifact: &Path) -> LaunchResult<Verification> {
        let unavailable = |reason: String| LaunchError::VerificationUnavailable {
            artifact: artifact.to_path_buf(),
            reason,
        };

        let output = Command::new(&self.command)
            .arg("-verify")
            .arg(artifact)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| unavailable(format!("cannot run `{}`: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(unavailable(format!(
                "`{} -verify` exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Verification {
            trusted: stdout.contains("jar verified."),
        })
    }
}

/// Verify each artifact in order and apply the trust policy.
///
/// Without `trust`, the first artifact that is untrusted or cannot be
/// verified fails the launch. With `trust`, every artifact is still checked
/// and reported but none blocks the launch.
pub async fn verify_all(
    verifier: &dyn Verifier,
    artifacts: &[CachedArtifact],
    trust: bool,
    cancel: &CancellationToken,
) -> LaunchResult<()> {
    for artifact in artifacts {
        debug!("Verifying if {} is signed...", artifact.name);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LaunchError::Aborted),
            outcome = verifier.verify(&artifact.local_path) => outcome,
        };

        match outcome {
            Ok(Verification { trusted: true }) => info!("{} correctly signed", artifact.name),
            Ok(Verification { trusted: false }) if trust => {
                warn!("{} not (correctly) signed, trusted explicitly", artifact.name)
            }
            Ok(Verification { trusted: false }) => {
                warn!("{} not (correctly) signed", artifact.name);
                return Err(LaunchError::Trust {
                    artifact: artifact.local_path.clone(),
                });
            }
            Err(e @ LaunchError::VerificationUnavailable { .. }) if trust => {
                warn!("{}; trusted explicitly", e)
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Verifier with a scripted outcome per file name; records what it checked.
    #[derive(Default)]
    struct ScriptedVerifier {
        outcomes: HashMap<String, Option<bool>>,
        checked: Mutex<Vec<String>>,
    }

    impl ScriptedVerifier {
        fn with(mut self, name: &str, outcome: Option<bool>) -> Self {
            self.outcomes.insert(name.to_string(), outcome);
            self
        }

        fn checked(&self) -> Vec<String> {
            self.checked.lock().clone()
        }
    }

    #[async_trait]
    impl Verifier for ScriptedVerifier {
        async fn verify(&self, artifact: &Path) -> LaunchResult<Verification> {
            let name = artifact.file_name().unwrap().to_string_lossy().to_string();
            self.checked.lock().push(name.clone());
            match self.outcomes.get(&name).copied().flatten() {
                Some(trusted) => Ok(Verification { trusted }),
                None => Err(LaunchError::VerificationUnavailable {
                    artifact: artifact.to_path_buf(),
                    reason: "no verifier".to_string(),
                }),
            }
        }
    }

    fn artifacts(names: &[&str]) -> Vec<CachedArtifact> {
        names
            .iter()
            .map(|name| CachedArtifact {
                name: name.to_string(),
                local_path: PathBuf::from("/cache").join(name),
                byte_length: 1,
                from_cache: false,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_verified_without_trust_succeeds() {
        let verifier = ScriptedVerifier::default().with("a.jar", Some(true));
        let cancel = CancellationToken::new();
        let result = verify_all(&verifier, &artifacts(&["a.jar"]), false, &cancel).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_untrusted_without_trust_fails_fast() {
        let verifier = ScriptedVerifier::default()
            .with("a.jar", Some(false))
            .with("b.jar", Some(true));
        let list = artifacts(&["a.jar", "b.jar"]);
        let err = verify_all(&verifier, &list, false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LaunchError::Trust {
                artifact: PathBuf::from("/cache/a.jar")
            }
        );
        assert_eq!(verifier.checked(), vec!["a.jar"]);
    }

    #[tokio::test]
    async fn test_untrusted_with_trust_checks_everything() {
        let verifier = ScriptedVerifier::default()
            .with("a.jar", Some(false))
            .with("b.jar", Some(true));
        let list = artifacts(&["a.jar", "b.jar"]);
        verify_all(&verifier, &list, true, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(verifier.checked(), vec!["a.jar", "b.jar"]);
    }

    #[tokio::test]
    async fn test_unavailable_verifier_with_and_without_trust() {
        let verifier = ScriptedVerifier::default().with("a.jar", None);
        let list = artifacts(&["a.jar"]);

        verify_all(&verifier, &list, true, &CancellationToken::new())
            .await
            .unwrap();

        let err = verify_all(&verifier, &list, false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::VerificationUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_verification_is_aborted() {
        let verifier = ScriptedVerifier::default().with("a.jar", Some(true));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = verify_all(&verifier, &artifacts(&["a.jar"]), false, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, LaunchError::Aborted);
        assert!(verifier.checked().is_empty());
    }

    #[tokio::test]
    async fn test_missing_jarsigner_is_unavailable() {
        let verifier = JarSigner::new("/nonexistent/jarsigner");
        let err = verifier.verify(Path::new("app.jar")).await.unwrap_err();
        assert!(matches!(err, LaunchError::VerificationUnavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_jarsigner_outcomes_from_exit_status_and_output() {
        // `echo` runs fine but never prints the verified marker.
        let outcome = JarSigner::new("echo").verify(Path::new("app.jar")).await.unwrap();
        assert!(!outcome.trusted);

        let err = JarSigner::new("false").verify(Path::new("app.jar")).await.unwrap_err();
        assert!(matches!(err, LaunchError::VerificationUnavailable { .. }));
    }
}
