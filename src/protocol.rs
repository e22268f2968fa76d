//! One JSON line in, one JSON line out.

use crate::error::{AdapterError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{BufRead, Write};

/// A parsed request: the method name and its raw parameter object.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub params: Map<String, Value>,
}

impl Request {
    /// Parses a single request line. Fields other than `method` and `params` are ignored.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(AdapterError::Input("No request received".to_string()));
        }

        let value: Value = serde_json::from_str(line)
            .map_err(|e| AdapterError::Input(format!("Invalid JSON: {}", e)))?;
        let mut object = match value {
            Value::Object(object) => object,
            _ => {
                return Err(AdapterError::Input(
                    "Invalid request: expected a JSON object".to_string(),
                ))
            }
        };

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            Some(other) => {
                return Err(AdapterError::Input(format!(
                    "Invalid request: method must be a string, got {}",
                    other
                )))
            }
            None => {
                return Err(AdapterError::Input(
                    "Invalid request: missing method".to_string(),
                ))
            }
        };

        let params = match object.remove("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(params)) => params,
            Some(other) => {
                return Err(AdapterError::InvalidParams(format!(
                    "params must be an object, got {}",
                    other
                )))
            }
        };

        Ok(Request { method, params })
    }
}

/// Reads exactly one line from `reader` and parses it as a request.
pub fn read_request<R: BufRead>(mut reader: R) -> Result<Request> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|e| AdapterError::Input(format!("Failed to read request: {}", e)))?;
    Request::parse(&line)
}

/// The single response emitted per invocation: `{"result": ...}` or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Result(String),
    Error(String),
}

impl Response {
    /// Maps the outcome of an invocation onto the response channel.
    ///
    /// With `legacy_error_channel`, errors raised inside the executor are
    /// reported the old way: inside `result`, worded as older callers expect.
    pub fn from_outcome(outcome: Result<String>, legacy_error_channel: bool) -> Self {
        match outcome {
            Ok(report) => Response::Result(report),
            Err(e) if legacy_error_channel && e.is_execution_side() => {
                Response::Result(e.legacy_message())
            }
            Err(e) => Response::Error(e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Result(_))
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Writes the response as one JSON line: results to `out`, errors to `err`.
    pub fn write_to<O: Write, E: Write>(&self, out: &mut O, err: &mut E) -> std::io::Result<()> {
        let line = serde_json::to_string(self)?;
        let sink: &mut dyn Write = if self.is_success() { out } else { err };
        writeln!(sink, "{}", line)?;
        sink.flush()
    }
}
