/// Errors produced by command-queue/process-runner/agent-registry operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("process spawn failed: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, partial_stdout: String },

    #[error("command exited with code {code}")]
    NonZeroExit { code: i32, partial_stdout: String },

    #[error("command was killed by signal {signal}")]
    Killed { signal: i32, partial_stdout: String },

    #[error("failed to parse agent output: {0}")]
    ParseFailure(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<AgentError> for relay_core::RelayError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Spawn(io_err) => relay_core::RelayError::Io(io_err),
            AgentError::Timeout { timeout_ms, partial_stdout } => {
                relay_core::RelayError::CommandTimeout { timeout_ms, partial_stdout }
            }
            AgentError::NonZeroExit { code, partial_stdout } => {
                relay_core::RelayError::CommandNonZeroExit { code, partial_stdout }
            }
            AgentError::Killed { signal, partial_stdout } => {
                relay_core::RelayError::CommandKilled { signal, partial_stdout }
            }
            AgentError::ParseFailure(msg) => relay_core::RelayError::AgentParseFailure(msg),
        }
    }
}
