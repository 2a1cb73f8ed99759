//! Spawns an agent CLI as a child process and waits on it with a two-phase
//! timeout: a short startup timeout bounded to the first byte of output, and
//! a longer overall timeout for the whole run. Escalates to a kill on either
//! expiry.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{instrument, warn};

use crate::error::{AgentError, Result};

pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Outcome of a single process invocation. `killed` is set whenever the
/// runner tore the child down itself, regardless of which timeout fired.
#[derive(Debug, Clone, Default)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub killed: bool,
}

#[derive(Debug, Clone)]
pub struct RunOpts {
    pub startup_timeout: Duration,
    pub overall_timeout: Duration,
    pub cwd: Option<String>,
}

impl Default for RunOpts {
    fn default() -> Self {
        RunOpts {
            startup_timeout: STARTUP_TIMEOUT,
            overall_timeout: SESSION_TIMEOUT,
            cwd: None,
        }
    }
}

/// Spawns `argv[0]` with `argv[1..]` as arguments and waits for it to
/// finish, enforcing `opts`'s timeouts. On a startup timeout (no stdout
/// byte within `opts.startup_timeout`) or an overall timeout, kills the
/// child and returns `AgentError::Timeout` carrying whatever stdout had
/// already been captured.
#[instrument(skip(argv), fields(argv0 = %argv.first().cloned().unwrap_or_default()))]
pub async fn run(argv: &[String], opts: RunOpts) -> Result<Output> {
    let Some((program, args)) = argv.split_first() else {
        return Err(AgentError::ParseFailure("empty argv".to_string()));
    };

    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(cwd) = &opts.cwd {
        command.current_dir(cwd);
    }
    let mut child = command.spawn()?;

    let mut stdout = BufReader::new(child.stdout.take().expect("piped stdout"));
    let mut stderr = child.stderr.take().expect("piped stderr");

    // The startup phase (waiting for the first line) is itself bounded by
    // the overall timeout — a short startup window is only meaningful when
    // it's no looser than the run's total budget.
    let startup_timeout = opts.startup_timeout.min(opts.overall_timeout);
    let mut collected = String::new();
    let read_everything = async {
        let mut first_line = String::new();
        match timeout(startup_timeout, stdout.read_line(&mut first_line)).await {
            Err(_) => return false,
            Ok(Err(_)) => return true,
            Ok(Ok(_)) => {}
        }
        collected.push_str(&first_line);
        let mut rest = String::new();
        let _ = stdout.read_to_string(&mut rest).await;
        collected.push_str(&rest);
        true
    };
    let timed_out = !matches!(timeout(opts.overall_timeout, read_everything).await, Ok(true));

    let mut stderr_buf = String::new();
    let _ = timeout(Duration::from_millis(500), stderr.read_to_string(&mut stderr_buf)).await;

    if timed_out {
        kill_and_wait(&mut child).await;
        return Err(AgentError::Timeout {
            timeout_ms: opts.overall_timeout.as_millis() as u64,
            partial_stdout: collected,
        });
    }

    let status = child.wait().await?;
    let exit_code = status.code();
    let signal = unix_signal(&status);

    if signal.is_some() {
        return Err(AgentError::Killed {
            signal: signal.unwrap(),
            partial_stdout: collected,
        });
    }

    if exit_code != Some(0) {
        return Err(AgentError::NonZeroExit {
            code: exit_code.unwrap_or(-1),
            partial_stdout: collected,
        });
    }

    Ok(Output {
        stdout: collected,
        stderr: stderr_buf,
        exit_code,
        signal: None,
        killed: false,
    })
}

async fn kill_and_wait(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        warn!(error = %err, "failed to signal child for kill");
    }
    let _ = timeout(Duration::from_secs(5), child.wait()).await;
}

#[cfg(unix)]
fn unix_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn unix_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
