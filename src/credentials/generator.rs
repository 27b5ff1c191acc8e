//! Out-of-band credential generation.
//!
//! The job itself (account registration) lives outside this crate; it is
//! started with a display name, awaited under a hard timeout, and must print
//! the new credential as its last `identifier:secret` line on stdout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, instrument, warn};

use super::store::Credential;
use crate::error::CredentialError;

/// Longest stderr excerpt kept on failure.
const MAX_STDERR: usize = 200;

/// Produces a fresh credential on demand.
#[async_trait]
pub trait CredentialGenerator: Send + Sync {
    /// Run one generation job.
    async fn generate(&self, display_name: &str) -> Result<Credential, CredentialError>;
}

/// Runs an external command and reads the credential from its stdout.
#[derive(Debug, Clone)]
pub struct ProcessCredentialGenerator {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessCredentialGenerator {
    /// Generator for `argv` (program first). `None` when `argv` is empty.
    pub fn new(argv: Vec<String>, timeout: Duration) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        Some(Self {
            program,
            args: argv.collect(),
            working_dir: None,
            timeout,
        })
    }

    /// Run the job from `dir`.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl CredentialGenerator for ProcessCredentialGenerator {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn generate(&self, display_name: &str) -> Result<Credential, CredentialError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(display_name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        info!(timeout_secs = self.timeout.as_secs(), "Starting credential generation");
        let child = command
            .spawn()
            .map_err(|e| CredentialError::GenerationFailed(format!("failed to start job: {e}")))?;

        // Dropping the future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("Credential generation timed out");
                return Err(CredentialError::GenerationTimeout(self.timeout));
            }
        };

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .chars()
                .take(MAX_STDERR)
                .collect();
            return Err(CredentialError::GenerationFailed(format!(
                "job exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let credential = stdout
            .lines()
            .rev()
            .find_map(Credential::parse_line)
            .ok_or_else(|| {
                CredentialError::GenerationFailed("job printed no credential".to_string())
            })?;

        info!(credential = %credential.label(), "Credential generated");
        Ok(credential)
    }
}
