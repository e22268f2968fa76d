use crate::config::AdapterConfig;
use crate::error::{AdapterError, Result};
use crate::executor::K6Executor;
use crate::protocol::Request;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// The operations a request can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `duration` and `vus` are optional and fall back to the configured defaults.
    ExecuteK6Test,
    /// `duration` and `vus` are required.
    ExecuteK6TestWithOptions,
    CheckK6Installation,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::ExecuteK6Test => "execute_k6_test",
            Method::ExecuteK6TestWithOptions => "execute_k6_test_with_options",
            Method::CheckK6Installation => "check_k6_installation",
        }
    }
}

impl FromStr for Method {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "execute_k6_test" => Ok(Method::ExecuteK6Test),
            "execute_k6_test_with_options" => Ok(Method::ExecuteK6TestWithOptions),
            "check_k6_installation" => Ok(Method::CheckK6Installation),
            other => Err(AdapterError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct RawRunParams {
    script_file: Option<String>,
    duration: Option<String>,
    vus: Option<u32>,
    seed: Option<u64>,
}

/// Parameters of a load test run after defaults have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
    pub script_file: String,
    pub duration: String,
    pub vus: u32,
    pub seed: Option<u64>,
}

impl RunParams {
    /// `execute_k6_test`: missing `duration`/`vus` take the configured defaults.
    pub fn with_defaults(params: &Map<String, Value>, config: &AdapterConfig) -> Result<Self> {
        let raw = parse_raw(params)?;
        Self::build(
            raw.script_file,
            raw.duration.unwrap_or_else(|| config.default_duration.clone()),
            raw.vus.unwrap_or(config.default_vus),
            raw.seed,
        )
    }

    /// `execute_k6_test_with_options`: every run parameter must be present.
    pub fn explicit(params: &Map<String, Value>) -> Result<Self> {
        let raw = parse_raw(params)?;
        let duration = raw.duration.ok_or_else(|| missing("duration"))?;
        let vus = raw.vus.ok_or_else(|| missing("vus"))?;
        Self::build(raw.script_file, duration, vus, raw.seed)
    }

    fn build(script_file: Option<String>, duration: String, vus: u32, seed: Option<u64>) -> Result<Self> {
        let script_file = script_file.ok_or_else(|| missing("script_file"))?;
        if vus == 0 {
            return Err(AdapterError::InvalidParams("vus must be at least 1".to_string()));
        }
        Ok(Self { script_file, duration, vus, seed })
    }
}

fn parse_raw(params: &Map<String, Value>) -> Result<RawRunParams> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| AdapterError::InvalidParams(e.to_string()))
}

fn missing(name: &str) -> AdapterError {
    AdapterError::InvalidParams(format!("missing required parameter `{}`", name))
}

/// Routes a request to the executor.
pub struct Dispatcher {
    executor: K6Executor,
}

impl Dispatcher {
    pub fn new(executor: K6Executor) -> Self {
        Self { executor }
    }

    pub async fn dispatch(&self, request: &Request) -> Result<String> {
        let method: Method = request.method.parse()?;
        let params = Value::Object(request.params.clone());
        info!(%method, %params, "received request");

        match method {
            Method::ExecuteK6Test => {
                let params = RunParams::with_defaults(&request.params, self.executor.config())?;
                self.run(params).await
            }
            Method::ExecuteK6TestWithOptions => {
                let params = RunParams::explicit(&request.params)?;
                self.run(params).await
            }
            Method::CheckK6Installation => self.executor.check_installation().await,
        }
    }

    async fn run(&self, params: RunParams) -> Result<String> {
        info!(
            script_file = %params.script_file,
            duration = %params.duration,
            vus = params.vus,
            "effective run parameters"
        );
        self.executor
            .execute(&params.script_file, &params.duration, params.vus, params.seed)
            .await
    }
}
