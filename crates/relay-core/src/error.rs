/// Error kinds for the relay core. Every variant maps to one of the error
/// taxonomy kinds described in the design documentation; `.code()` returns
/// the matching SCREAMING_SNAKE_CASE identifier for logging and fixtures.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("sender not in allowFrom")]
    AdmissionRefused,

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64, partial_stdout: String },

    #[error("command exited with code {code}")]
    CommandNonZeroExit { code: i32, partial_stdout: String },

    #[error("command was killed by signal {signal}")]
    CommandKilled { signal: i32, partial_stdout: String },

    #[error("failed to parse agent output: {0}")]
    AgentParseFailure(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailure(String),

    #[error("session store write failed: {0}")]
    SessionStoreWriteFailure(String),

    #[error("provider transport error: {0}")]
    ProviderTransportError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::AdmissionRefused => "ADMISSION_REFUSED",
            RelayError::ConfigInvalid(_) => "CONFIG_INVALID",
            RelayError::CommandTimeout { .. } => "COMMAND_TIMEOUT",
            RelayError::CommandNonZeroExit { .. } => "COMMAND_NON_ZERO_EXIT",
            RelayError::CommandKilled { .. } => "COMMAND_KILLED",
            RelayError::AgentParseFailure(_) => "AGENT_PARSE_FAILURE",
            RelayError::TranscriptionFailure(_) => "TRANSCRIPTION_FAILURE",
            RelayError::SessionStoreWriteFailure(_) => "SESSION_STORE_WRITE_FAILURE",
            RelayError::ProviderTransportError(_) => "PROVIDER_TRANSPORT_ERROR",
            RelayError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
