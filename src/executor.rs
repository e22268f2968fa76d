use crate::config::AdapterConfig;
use crate::duration::{format_duration, parse_duration};
use crate::error::{AdapterError, Result};
use crate::simulator::Simulator;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

const SCRIPT_EXTENSION: &str = "js";

/// How long `k6 version` may take before k6 is considered unusable.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Stand-in deadline for limits too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Added to the test duration when no explicit timeout is configured; matches k6's default gracefulStop.
const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Outcome of probing the k6 executable.
#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    Available { version: String },
    Unavailable { reason: String },
}

/// Whether a run used the real executable or the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Real,
    Simulated,
}

/// Runs k6 for one request, or simulates it when k6 is unavailable.
pub struct K6Executor {
    config: AdapterConfig,
}

impl K6Executor {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Runs `script_file` for `duration` with `vus` virtual users and returns the k6 summary.
    pub async fn execute(
        &self,
        script_file: &str,
        duration: &str,
        vus: u32,
        seed: Option<u64>,
    ) -> Result<String> {
        let script = resolve_script(script_file)?;
        let run_duration = parse_duration(duration)?;
        let executable = self.config.executable();
        info!(k6_bin = %executable.display(), "resolved k6 executable");

        let (mode, report) = match self.probe().await {
            Availability::Available { version } => {
                info!(%version, "k6 is available");
                let output = self.run(&script, duration.trim(), run_duration, vus).await?;
                if !output.success() {
                    return Err(AdapterError::Execution {
                        code: output.exit_code,
                        stderr: output.stderr,
                    });
                }
                (RunMode::Real, output.stdout)
            }
            Availability::Unavailable { reason } => {
                warn!(%reason, "k6 is not available, simulating the run");
                let mut simulator = Simulator::new(seed.or(self.config.seed));
                (RunMode::Simulated, simulator.simulate(&script, run_duration, vus))
            }
        };

        info!(?mode, bytes = report.len(), "load test finished");
        Ok(report)
    }

    /// Reports whether k6 can be run, and which version it is.
    pub async fn check_installation(&self) -> Result<String> {
        let executable = self.config.executable();
        Ok(match self.probe().await {
            Availability::Available { version } => {
                format!("k6 is installed at {}: {}", executable.display(), version)
            }
            Availability::Unavailable { reason } => format!(
                "k6 is not available at {} ({}); load tests will run in simulation mode",
                executable.display(),
                reason
            ),
        })
    }

    /// Runs `k6 version`; any failure to do so means k6 is unavailable.
    pub async fn probe(&self) -> Availability {
        let executable = self.config.executable();
        let mut cmd = Command::new(&executable);
        cmd.arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match timeout(PROBE_TIMEOUT, cmd.output()).await {
            Err(_) => Availability::Unavailable {
                reason: format!("`{} version` timed out after {}", executable.display(), format_duration(PROBE_TIMEOUT)),
            },
            Ok(Err(e)) => Availability::Unavailable {
                reason: format!("failed to run {}: {}", executable.display(), e),
            },
            Ok(Ok(output)) if !output.status.success() => Availability::Unavailable {
                reason: format!(
                    "`{} version` exited with {}: {}",
                    executable.display(),
                    output.status,
                    decode_output(&output.stderr).trim()
                ),
            },
            Ok(Ok(output)) => Availability::Available {
                version: decode_output(&output.stdout).trim().to_string(),
            },
        }
    }

    /// The limit for a real run: the configured timeout, or the test duration plus grace.
    pub fn run_timeout(&self, run_duration: Duration) -> Result<Duration> {
        let configured = self
            .config
            .timeout()
            .map_err(|e| AdapterError::Config(format!("{:#}", e)))?;
        Ok(configured.unwrap_or(run_duration.saturating_add(DEFAULT_GRACE)))
    }

    fn build_command(&self, script: &Path, duration: &str, vus: u32) -> Command {
        let mut cmd = Command::new(self.config.executable());
        cmd.arg("run")
            .arg("-d")
            .arg(duration)
            .arg("-u")
            .arg(vus.to_string())
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so a timeout can take down anything k6 spawned.
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }
        cmd
    }

    async fn run(
        &self,
        script: &Path,
        duration: &str,
        run_duration: Duration,
        vus: u32,
    ) -> Result<ProcessOutput> {
        let limit = self.run_timeout(run_duration)?;
        let mut cmd = self.build_command(script, duration, vus);
        info!(
            command = %describe_command(&self.config.executable(), script, duration, vus),
            timeout = %format_duration(limit),
            "executing k6"
        );

        let mut child = cmd.spawn().map_err(|e| {
            AdapterError::Unexpected(format!(
                "failed to start {}: {}",
                self.config.executable().display(),
                e
            ))
        })?;
        let pid = child.id();
        let started = Instant::now();
        let deadline = started.checked_add(limit).unwrap_or(started + FAR_FUTURE);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AdapterError::Unexpected("failed to capture k6 stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AdapterError::Unexpected("failed to capture k6 stderr".to_string()))?;
        let mut stdout_task = tokio::spawn(read_output(stdout));
        let mut stderr_task = tokio::spawn(read_output(stderr));

        let status = match timeout_at(deadline, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(timeout = %format_duration(limit), "k6 exceeded timeout; killing process group");
                kill_process_group(&mut child).await?;
                stdout_task.abort();
                stderr_task.abort();
                return Err(AdapterError::Timeout(limit));
            }
        };

        // Anything k6 left running in its group can hold the pipes open past its own exit.
        let collected = timeout_at(deadline, async {
            let stdout = join_output(&mut stdout_task).await;
            let stderr = join_output(&mut stderr_task).await;
            (stdout, stderr)
        })
        .await;
        let (stdout, stderr) = match collected {
            Ok(collected) => collected,
            Err(_) => {
                warn!(timeout = %format_duration(limit), "k6 output still open at timeout; killing process group");
                kill_group(pid);
                stdout_task.abort();
                stderr_task.abort();
                return Err(AdapterError::Timeout(limit));
            }
        };

        let output = ProcessOutput {
            stdout: stdout?,
            stderr: stderr?,
            exit_code: status.code(),
        };

        info!(exit_code = ?output.exit_code, "k6 exited");
        info!(stdout = %output.stdout, "k6 stdout");
        info!(stderr = %output.stderr, "k6 stderr");
        Ok(output)
    }
}

/// Resolves a script path to an absolute path and checks it is an existing `.js` file.
pub fn resolve_script(script_file: &str) -> Result<PathBuf> {
    let given = PathBuf::from(script_file);
    let absolute = if given.is_absolute() {
        given.clone()
    } else {
        std::env::current_dir()?.join(&given)
    };

    if !absolute.is_file() {
        return Err(AdapterError::ScriptNotFound(given));
    }

    // The extension is checked on the file a symlink points at, not on the link.
    let resolved = std::fs::canonicalize(&absolute)?;
    if resolved.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
        return Err(AdapterError::InvalidFileType(given));
    }

    debug!(script = %resolved.display(), "resolved script path");
    Ok(resolved)
}

fn describe_command(executable: &Path, script: &Path, duration: &str, vus: u32) -> String {
    format!(
        "{} run -d {} -u {} {}",
        executable.display(),
        duration,
        vus,
        script.display()
    )
}

async fn read_output<R>(mut reader: R) -> std::io::Result<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(decode_output(&buf))
}

/// Decodes process output as UTF-8, dropping byte sequences that are not valid.
pub fn decode_output(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

async fn join_output(task: &mut JoinHandle<std::io::Result<String>>) -> Result<String> {
    task.await
        .map_err(|e| AdapterError::Unexpected(format!("failed to collect k6 output: {}", e)))?
        .map_err(AdapterError::from)
}

/// Sends SIGKILL to the process group led by `pid`. The group outlives its
/// leader, so this still reaches children after k6 itself has been reaped.
fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            // SAFETY: killpg only sends a signal; the group id is the child's pid
            // because it was spawned with process_group(0).
            let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
            if rc != 0 {
                warn!(err = %std::io::Error::last_os_error(), "killpg failed");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

async fn kill_process_group(child: &mut Child) -> Result<()> {
    kill_group(child.id());

    if let Err(err) = child.start_kill() {
        debug!(%err, "start_kill after killpg");
    }
    child.wait().await?;
    Ok(())
}
