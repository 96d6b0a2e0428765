//! Invocation of external programs.
//!
//! Every external tool (terraform, ansible-playbook, scp, ssh, docker and the
//! cloud CLIs) is launched through [`ToolRunner`], so the pipeline can be
//! driven by a scripted runner in tests.

use crate::error::{Error, Result};
use crate::log::*;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// A single external program call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Written to the child's stdin, then closed.
    pub stdin: Option<String>,
    /// Capture stdout instead of streaming it to the terminal.
    pub capture: bool,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program and arguments joined for log output.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    /// Terminated by a signal.
    Killed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit: Exit,
    pub stdout: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit == Exit::Code(0)
    }

    pub fn describe_exit(&self) -> String {
        match self.exit {
            Exit::Code(code) => format!("exit code {code}"),
            Exit::Killed => "terminated by signal".to_string(),
            Exit::TimedOut => "timed out".to_string(),
        }
    }
}

pub trait ToolRunner {
    /// Runs the invocation to completion. `Err` means the program could not be
    /// started at all; a non-zero exit is reported through [`ToolOutput`].
    fn run(&mut self, invocation: &Invocation) -> Result<ToolOutput>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<ToolOutput> {
        match &invocation.cwd {
            Some(dir) => log_debug(&format!(
                "Executing in '{}': {}",
                dir.display(),
                invocation.display()
            )),
            None => log_debug(&format!("Executing: {}", invocation.display())),
        }

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        command.stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        command.stdout(if invocation.capture {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        command.stderr(Stdio::inherit());

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Tool(format!(
                    "{} command not found. Please install {} to continue.",
                    invocation.program, invocation.program
                ))
            } else {
                Error::Tool(format!("Failed to execute {}: {e}", invocation.program))
            }
        })?;

        if let (Some(input), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
            if let Err(e) = stdin.write_all(input.as_bytes()) {
                drop(stdin);
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Tool(format!(
                    "Failed to write to {}: {e}",
                    invocation.program
                )));
            }
        }

        // Drain stdout on its own thread so a chatty child cannot block on a full pipe.
        let stdout_handle = child.stdout.take().map(|mut stdout| {
            std::thread::spawn(move || {
                let mut buffer = String::new();
                let _ = stdout.read_to_string(&mut buffer);
                buffer
            })
        });

        let started = Instant::now();
        let exit = loop {
            let polled = child
                .try_wait()
                .map_err(|e| Error::Tool(format!("Failed to wait for {}: {e}", invocation.program)))?;
            if let Some(status) = polled {
                break match status.code() {
                    Some(code) => Exit::Code(code),
                    None => Exit::Killed,
                };
            }
            if let Some(timeout) = invocation.timeout {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Exit::TimedOut;
                }
            }
            std::thread::sleep(Duration::from_millis(50));
        };

        let stdout = stdout_handle
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        Ok(ToolOutput { exit, stdout })
    }
}
