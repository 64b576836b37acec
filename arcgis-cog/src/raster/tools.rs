use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ArcgisError;

/// One command line of a GDAL utility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: &'static str,
    pub args: Vec<OsString>,
    /// File the tool is expected to produce (or update in place)
    pub output: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: &'static str) -> Self {
        ToolInvocation {
            program,
            args: Vec::new(),
            output: None,
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn output(mut self, path: &Path) -> Self {
        self.output = Some(path.to_path_buf());
        self
    }

    /// Arguments as UTF-8 (lossy), handy for logs and assertions
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string())
            .chain(self.args_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs external raster tools; a non-zero exit must come back as an error
pub trait ToolRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<()>;
}

/// Runs the GDAL command-line utilities found on `PATH`
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalCli;

impl ToolRunner for GdalCli {
    fn run(&self, invocation: &ToolInvocation) -> Result<()> {
        log::debug!("Running: {}", invocation.command_line());
        let status = Command::new(invocation.program)
            .args(&invocation.args)
            .status()
            .with_context(|| {
                format!(
                    "Failed to execute {}. Make sure GDAL is installed and {} is in PATH",
                    invocation.program, invocation.program
                )
            })?;

        if !status.success() {
            return Err(ArcgisError::ToolFailed {
                tool: invocation.program.to_string(),
                status: status.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl<R: ToolRunner + ?Sized> ToolRunner for &R {
    fn run(&self, invocation: &ToolInvocation) -> Result<()> {
        (**self).run(invocation)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    /// Records invocations and writes a placeholder for each expected output
    #[derive(Default)]
    pub(crate) struct RecordingRunner {
        pub(crate) invocations: RefCell<Vec<ToolInvocation>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Report a non-zero exit whenever `program` runs
        pub(crate) fn failing_on(program: &'static str) -> Self {
            RecordingRunner {
                invocations: RefCell::new(Vec::new()),
                fail_on: Some(program),
            }
        }

        pub(crate) fn programs(&self) -> Vec<&'static str> {
            self.invocations.borrow().iter().map(|i| i.program).collect()
        }
    }

    impl ToolRunner for RecordingRunner {
        fn run(&self, invocation: &ToolInvocation) -> Result<()> {
            self.invocations.borrow_mut().push(invocation.clone());
            if self.fail_on == Some(invocation.program) {
                return Err(ArcgisError::ToolFailed {
                    tool: invocation.program.to_string(),
                    status: "exit status: 1".to_string(),
                }
                .into());
            }
            if let Some(output) = &invocation.output {
                if !output.exists() {
                    fs::write(output, invocation.command_line())?;
                }
            }
            Ok(())
        }
    }
}
