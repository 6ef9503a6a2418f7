use core::fmt;
use std::{
    ffi::{OsStr, OsString},
    io::{self, Write as _},
    os::unix::process::ExitStatusExt as _,
    process::{Command, Stdio},
};

use log::{debug, trace};
use nix::sys::signal::Signal;
use types::HidslError;

use crate::interrupt;

/// An environment variable set for a tool, kept out of logs
#[derive(Clone, PartialEq, Eq)]
struct EnvVar {
    key: &'static str,
    value: String,
}

impl fmt::Debug for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=<redacted>", self.key)
    }
}

/// An invocation of an external tool, always by absolute path
#[derive(Clone, Debug)]
pub(crate) struct ToolCommand {
    program: &'static str,
    args: Vec<OsString>,
    env: Vec<EnvVar>,
    input: Option<Vec<u8>>,
    capture: bool,
}

impl ToolCommand {
    pub(crate) fn new(program: &'static str) -> Self {
        Self {
            program,
            args: Vec::new(),
            env: Vec::new(),
            input: None,
            capture: false,
        }
    }

    pub(crate) fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub(crate) fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Sets an environment variable, for secrets that must stay off the command line
    pub(crate) fn env(mut self, key: &'static str, value: &str) -> Self {
        self.env.push(EnvVar {
            key,
            value: value.to_owned(),
        });
        self
    }

    /// Feeds the given bytes to the tool's standard input
    pub(crate) fn stdin(mut self, input: &[u8]) -> Self {
        self.input = Some(input.to_vec());
        self
    }

    /// Captures standard output even in verbose mode
    pub(crate) fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    pub(crate) fn program(&self) -> &'static str {
        self.program
    }

    pub(crate) fn env_vars(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.env.iter().map(|v| (v.key, v.value.as_str()))
    }

    /// Program and arguments, lossily converted for logging and matching
    pub(crate) fn command_line(&self) -> Vec<String> {
        let mut line = vec![self.program.to_owned()];
        line.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        line
    }
}

/// Runs external tools on behalf of the pipelines
pub(crate) trait Runner {
    /// Runs the command to completion and returns its captured standard output
    ///
    /// # Errors
    ///
    /// If the tool couldn't be started or exited unsuccessfully
    fn run(&self, cmd: &ToolCommand) -> Result<Vec<u8>, HidslError>;

    /// Fails with [`HidslError::Aborted`] once the user asked us to stop
    fn check_interrupt(&self) -> Result<(), HidslError> {
        interrupt::check()
    }
}

#[derive(Debug)]
pub(crate) struct SystemRunner {
    verbose: bool,
}

impl SystemRunner {
    pub(crate) fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Runner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<Vec<u8>, HidslError> {
        self.check_interrupt()?;

        debug!("Running command: {}", cmd.command_line().join(" "));

        let stdout = if cmd.capture || !self.verbose {
            Stdio::piped()
        } else {
            Stdio::inherit()
        };

        let stderr = if self.verbose {
            Stdio::inherit()
        } else {
            Stdio::piped()
        };

        let stdin = if cmd.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let mut child = Command::new(cmd.program())
            .args(&cmd.args)
            .envs(cmd.env_vars())
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .spawn()?;

        if let (Some(input), Some(mut pipe)) = (&cmd.input, child.stdin.take()) {
            match pipe.write_all(input) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    trace!("{} closed its input early", cmd.program());
                }
                Err(e) => return Err(e.into()),
            }
        }

        let output = child.wait_with_output()?;
        trace!("{} exited with {}", cmd.program(), output.status);

        if output.status.signal() == Some(Signal::SIGINT as i32) || interrupt::is_set() {
            return Err(HidslError::Aborted);
        }

        if !output.status.success() {
            return Err(HidslError::Subprocess {
                program: cmd.program().to_owned(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        if cmd.capture {
            Ok(output.stdout)
        } else {
            Ok(Vec::new())
        }
    }
}
