use core::{cell::RefCell, fmt};
use std::{
    io,
    path::{Path, PathBuf},
};

use types::{HidslError, Partition};

use crate::{
    exec::{Runner, ToolCommand},
    mount::{MountOptions, Mounter},
};

type Hook = Box<dyn Fn(&[String])>;

/// Records every command instead of running it
#[derive(Default)]
pub(crate) struct RecordingRunner {
    calls: RefCell<Vec<Vec<String>>>,
    envs: RefCell<Vec<Vec<(String, String)>>>,
    failures: Vec<(String, i32)>,
    hooks: Vec<(String, Hook)>,
    interrupted: bool,
    stdout: Vec<u8>,
}

impl fmt::Debug for RecordingRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingRunner")
            .field("calls", &self.calls)
            .field("failures", &self.failures)
            .field("interrupted", &self.interrupted)
            .finish_non_exhaustive()
    }
}

impl RecordingRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fails every command whose command line contains `pattern`
    pub(crate) fn failing_on(mut self, pattern: &str, code: i32) -> Self {
        self.failures.push((pattern.to_owned(), code));
        self
    }

    /// Runs `hook` with the command line of every command containing `pattern`
    ///
    /// Stands in for the side effects of the real tool.
    pub(crate) fn on_command(mut self, pattern: &str, hook: impl Fn(&[String]) + 'static) -> Self {
        self.hooks.push((pattern.to_owned(), Box::new(hook)));
        self
    }

    /// Behaves as if Ctrl-C had been hit before anything ran
    pub(crate) fn interrupted(mut self) -> Self {
        self.interrupted = true;
        self
    }

    /// Standard output returned for captured commands
    pub(crate) fn with_stdout(mut self, stdout: &[u8]) -> Self {
        self.stdout = stdout.to_vec();
        self
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    /// Environment variables of every command, in call order
    pub(crate) fn envs(&self) -> Vec<Vec<(String, String)>> {
        self.envs.borrow().clone()
    }

    pub(crate) fn programs(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|c| c[0].clone())
            .collect()
    }
}

impl Runner for RecordingRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<Vec<u8>, HidslError> {
        self.check_interrupt()?;

        let line = cmd.command_line();
        let joined = line.join(" ");
        self.calls.borrow_mut().push(line.clone());
        self.envs.borrow_mut().push(
            cmd.env_vars()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        );

        for (pattern, code) in &self.failures {
            if joined.contains(pattern.as_str()) {
                return Err(HidslError::Subprocess {
                    program: cmd.program().to_owned(),
                    code: Some(*code),
                    stderr: String::from("recorded failure"),
                });
            }
        }

        for (pattern, hook) in &self.hooks {
            if joined.contains(pattern.as_str()) {
                hook(&line);
            }
        }

        Ok(self.stdout.clone())
    }

    fn check_interrupt(&self) -> Result<(), HidslError> {
        if self.interrupted {
            return Err(HidslError::Aborted);
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum MountCall {
    Mount(PathBuf, PathBuf),
    Unmount(PathBuf),
}

/// Records mounts and unmounts instead of performing them
#[derive(Debug, Default)]
pub(crate) struct RecordingMounter {
    calls: RefCell<Vec<MountCall>>,
    data: RefCell<Vec<String>>,
    fail_mount: Vec<PathBuf>,
    fail_unmount: Vec<PathBuf>,
}

impl RecordingMounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_mount(mut self, target: impl Into<PathBuf>) -> Self {
        self.fail_mount.push(target.into());
        self
    }

    pub(crate) fn failing_unmount(mut self, target: impl Into<PathBuf>) -> Self {
        self.fail_unmount.push(target.into());
        self
    }

    pub(crate) fn calls(&self) -> Vec<MountCall> {
        self.calls.borrow().clone()
    }

    pub(crate) fn data(&self) -> Vec<String> {
        self.data.borrow().clone()
    }
}

impl Mounter for RecordingMounter {
    fn mount(
        &self,
        partition: &Partition,
        target: &Path,
        options: &MountOptions,
    ) -> Result<(), HidslError> {
        self.calls.borrow_mut().push(MountCall::Mount(
            partition.device().to_path_buf(),
            target.to_path_buf(),
        ));
        self.data.borrow_mut().push(options.to_data());

        if self.fail_mount.iter().any(|t| t == target) {
            return Err(HidslError::Mount {
                device: partition.device().to_path_buf(),
                target: target.to_path_buf(),
                err: io::Error::from(io::ErrorKind::InvalidInput),
            });
        }

        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<(), HidslError> {
        self.calls
            .borrow_mut()
            .push(MountCall::Unmount(target.to_path_buf()));

        if self.fail_unmount.iter().any(|t| t == target) {
            return Err(HidslError::Unmount {
                target: target.to_path_buf(),
                err: io::Error::other("target is busy"),
            });
        }

        Ok(())
    }
}
