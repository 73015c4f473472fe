//! External process execution for lipoforge.
//!
//! Every external tool the pipeline touches (perl/make, cmake, libtool,
//! lipo, xcodebuild, git, the xcrun probes) goes through [`CommandRunner`].
//! The runner owns three concerns:
//! - spawning a command with a working directory and environment overrides
//!   (ambient process environment is inherited; overrides win on collision)
//! - capturing stdout/stderr and converting the exit status into a typed
//!   [`ProcessError`]
//! - script mode: persisting a multi-line shell script to a transient
//!   executable file and running it through `sh`, so that a build tool sees
//!   several exported variables inside one shell
//!
//! Cancellation is cooperative: a shared [`CancellationFlag`] is polled
//! while waiting, and a cancelled child receives SIGTERM followed by
//! SIGKILL after a grace period.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

/// Errors from process execution.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("process was killed by signal {signal}")]
    Signalled { signal: i32 },

    #[error("process exited with code {code}: {message}")]
    Failed { code: i32, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for process operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Captured output of a successfully exited process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code (always 0 for a successful run).
    pub exit_code: i32,
    /// Captured stdout, empty when capture was disabled.
    pub stdout: String,
    /// Captured stderr, empty when capture was disabled.
    pub stderr: String,
}

impl ProcessOutput {
    /// Stdout with surrounding whitespace removed, for one-line probes.
    pub fn stdout_trimmed(&self) -> String {
        self.stdout.trim().to_string()
    }
}

/// What to execute: a plain command or a generated shell script.
#[derive(Debug, Clone)]
pub enum Invocation {
    /// Run `program` with `args` directly.
    Command { program: String, args: Vec<String> },
    /// Persist `text` to a transient executable file and run it via `sh`.
    ///
    /// The file does not outlive the call; callers must not assume it
    /// persists after the runner returns.
    Script { text: String },
}

/// A single external command invocation.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub invocation: Invocation,
    /// Working directory; inherited from the caller when `None`.
    pub working_dir: Option<PathBuf>,
    /// Environment overrides, merged over the ambient process environment.
    pub env: HashMap<String, String>,
    /// Capture stdout/stderr (`true`) or inherit the caller's stdio.
    pub capture: bool,
}

impl CommandRequest {
    /// A plain command invocation with captured output.
    pub fn command(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            invocation: Invocation::Command {
                program: program.into(),
                args: args.into_iter().map(Into::into).collect(),
            },
            working_dir: None,
            env: HashMap::new(),
            capture: true,
        }
    }

    /// A script invocation with captured output.
    pub fn script(text: impl Into<String>) -> Self {
        Self {
            invocation: Invocation::Script { text: text.into() },
            working_dir: None,
            env: HashMap::new(),
            capture: true,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &HashMap<String, String>) -> Self {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    /// Inherit the caller's stdio instead of capturing.
    pub fn inherit_output(mut self) -> Self {
        self.capture = false;
        self
    }

    /// The program name, for logging.
    pub fn program(&self) -> &str {
        match &self.invocation {
            Invocation::Command { program, .. } => program,
            Invocation::Script { .. } => "sh",
        }
    }
}

/// Shared cancellation flag, cloneable across threads.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of any in-flight and future runs.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Abstraction over process execution.
///
/// A run succeeds only when the process exits with code 0; a non-zero exit
/// becomes [`ProcessError::Failed`] carrying stderr (falling back to stdout,
/// then a placeholder), and an OS-signal termination becomes
/// [`ProcessError::Signalled`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, request: &CommandRequest) -> ProcessResult<ProcessOutput>;
}

/// Runner backed by real OS processes.
pub struct SystemRunner {
    cancel: CancellationFlag,
    termination_grace: Duration,
    poll_interval: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self {
            cancel: CancellationFlag::new(),
            termination_grace: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner sharing an externally owned cancellation flag.
    pub fn with_cancellation(cancel: CancellationFlag) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    fn wait_with_cancellation(&self, child: &mut Child) -> ProcessResult<std::process::ExitStatus> {
        loop {
            if self.cancel.is_cancelled() {
                self.terminate_child(child)?;
                return Err(ProcessError::Cancelled);
            }

            match child.try_wait()? {
                Some(status) => return Ok(status),
                None => std::thread::sleep(self.poll_interval),
            }
        }
    }

    /// Terminate a child gracefully, then forcefully after the grace period.
    fn terminate_child(&self, child: &mut Child) -> ProcessResult<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            let _ = signal::kill(pid, Signal::SIGTERM);
        }
        #[cfg(not(unix))]
        {
            let _ = child.kill();
        }

        let start = Instant::now();
        while start.elapsed() < self.termination_grace {
            match child.try_wait()? {
                Some(_) => return Ok(()),
                None => std::thread::sleep(self.poll_interval),
            }
        }

        let _ = child.kill();
        let _ = child.wait();
        Ok(())
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, request: &CommandRequest) -> ProcessResult<ProcessOutput> {
        if self.cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }

        // Script mode writes the text to a transient file invoked via `sh`.
        // The guard keeps the file alive until the process has exited.
        let mut script_guard = None;
        let (program, args) = match &request.invocation {
            Invocation::Command { program, args } => (program.clone(), args.clone()),
            Invocation::Script { text } => {
                let mut file = tempfile::Builder::new()
                    .prefix("lipoforge-")
                    .suffix(".sh")
                    .tempfile()?;
                file.write_all(text.as_bytes())?;
                file.flush()?;
                let path = file.path().to_string_lossy().into_owned();
                script_guard = Some(file);
                ("sh".to_string(), vec![path])
            }
        };

        let mut command = Command::new(&program);
        command.args(&args).envs(&request.env);
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }
        if request.capture {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        debug!(program = %program, args = ?args, "spawning process");

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Drain the pipes on reader threads so a chatty child cannot block
        // on a full pipe buffer while we poll for exit.
        let stdout_handle = child.stdout.take().map(|out| {
            std::thread::spawn(move || {
                let mut buffer = String::new();
                for line in BufReader::new(out).lines().map_while(Result::ok) {
                    buffer.push_str(&line);
                    buffer.push('\n');
                }
                buffer
            })
        });
        let stderr_handle = child.stderr.take().map(|err| {
            std::thread::spawn(move || {
                let mut buffer = String::new();
                for line in BufReader::new(err).lines().map_while(Result::ok) {
                    buffer.push_str(&line);
                    buffer.push('\n');
                }
                buffer
            })
        });

        let status = self.wait_with_cancellation(&mut child)?;

        let stdout = stdout_handle
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        let stderr = stderr_handle
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        drop(script_guard);

        match status.code() {
            Some(0) => Ok(ProcessOutput {
                exit_code: 0,
                stdout,
                stderr,
            }),
            Some(code) => {
                let message = if !stderr.trim().is_empty() {
                    stderr.trim().to_string()
                } else if !stdout.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    "no output".to_string()
                };
                Err(ProcessError::Failed { code, message })
            }
            None => {
                #[cfg(unix)]
                let signal = {
                    use std::os::unix::process::ExitStatusExt;
                    status.signal().unwrap_or(0)
                };
                #[cfg(not(unix))]
                let signal = 0;
                Err(ProcessError::Signalled { signal })
            }
        }
    }
}

/// Run a command and return its trimmed single-line stdout.
///
/// Convenience for toolchain probes (`xcode-select -p`, `xcrun
/// --show-sdk-version` and friends).
pub fn output_line(
    runner: &dyn CommandRunner,
    program: impl Into<String>,
    args: impl IntoIterator<Item = impl Into<String>>,
) -> ProcessResult<String> {
    let output = runner.run(&CommandRequest::command(program, args))?;
    Ok(output.stdout_trimmed())
}
