//! Launcher for JNLP-described applications.
//!
//! A launch reads a descriptor, downloads the resources it names into a
//! target directory (reusing files already there), verifies their
//! signatures and runs the entry point as a supervised child process.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod process;
pub mod verify;

pub use config::LauncherConfig;
pub use descriptor::{
    DescriptorReader, JnlpReader, LaunchDescriptor, ResourceRef, RuntimeProperty, read_descriptor,
};
pub use error::{LaunchError, LaunchResult};
pub use fetch::{CachedArtifact, DownloadProgress, LogProgress, ResourceFetcher};
pub use orchestrator::{LaunchState, Launcher};
pub use process::{Execution, OutputBuffer, ProcessIo, ProcessSupervisor, Signal};
pub use verify::{JarSigner, Verification, Verifier};
