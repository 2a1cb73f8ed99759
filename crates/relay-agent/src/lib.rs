pub mod error;
pub mod queue;
pub mod registry;
pub mod runner;

pub use error::AgentError;
pub use queue::CommandQueue;
pub use registry::{build_args, parse_output, BuildContext};
pub use runner::{run, Output, RunOpts, SESSION_TIMEOUT, STARTUP_TIMEOUT};
