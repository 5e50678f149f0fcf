use serde::{Deserialize, Serialize};

/// A compiler toolchain identifier advertised by a worker, e.g. "9.8.1".
/// Versions are opaque to the pool and ordered as strings.
pub type Version = String;

/// What the client wants the worker to produce from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunCommand {
    Run,
    Core,
    Asm,
}

impl std::fmt::Display for RunCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunCommand::Run => write!(f, "run"),
            RunCommand::Core => write!(f, "core"),
            RunCommand::Asm => write!(f, "asm"),
        }
    }
}

/// A compile/run job as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub command: RunCommand,
    pub source: String,
    pub version: Version,
    /// Optimisation setting passed through to the compiler, e.g. "O1".
    pub opt: String,
}

/// Why a job produced no usable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunError {
    /// A worker-side timeout while compiling or running the job.
    Timeout,
    /// The pool could not get a response from any worker: no workers are
    /// registered, the RPC failed, or the response did not verify.
    Backend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub time_taken_secs: f64,
}

/// Outcome of a job, as delivered back to the submitting client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", content = "data", rename_all = "snake_case")]
pub enum RunResponse {
    Ok(RunOutput),
    Error(RunError),
}

impl RunResponse {
    /// The synthetic response used whenever the pool itself has to answer
    /// for a worker.
    pub fn backend_error() -> Self {
        RunResponse::Error(RunError::Backend)
    }
}
