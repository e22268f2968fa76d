use clap::Parser;
use std::path::PathBuf;

/// The request itself always arrives on stdin; these flags only tune how it is served.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "k6-adapter")]
#[command(about = "Runs one k6 load test described by a JSON request on stdin", long_about = None)]
#[command(version)]
pub struct Args {
    /// Configuration file (YAML, or JSON with a .json extension)
    #[arg(long = "config", env = "K6_ADAPTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path or name of the k6 executable (default: `k6` from PATH)
    #[arg(long = "k6-bin", env = "K6_BIN")]
    pub k6_bin: Option<PathBuf>,

    /// Duration used by execute_k6_test when the request omits one (e.g. 30s, 5m)
    #[arg(long = "default-duration", env = "K6_DEFAULT_DURATION")]
    pub default_duration: Option<String>,

    /// Virtual users used by execute_k6_test when the request omits them
    #[arg(long = "default-vus", env = "K6_DEFAULT_VUS")]
    pub default_vus: Option<u32>,

    /// Hard limit for the k6 run (default: test duration plus 30s grace)
    #[arg(long = "timeout", env = "K6_TIMEOUT")]
    pub timeout: Option<String>,

    /// Seed for the simulated report when k6 is unavailable
    #[arg(long = "seed", env = "K6_SIM_SEED")]
    pub seed: Option<u64>,

    /// Report executor errors inside `result` with exit code 0, as older clients expect
    #[arg(long = "legacy-error-channel", env = "K6_ADAPTER_LEGACY_ERRORS")]
    pub legacy_error_channel: bool,

    /// Diagnostic log level written to stderr: error, warn, info, debug, trace
    #[arg(long = "log-level", env = "K6_ADAPTER_LOG", default_value = "info")]
    pub log_level: String,
}
