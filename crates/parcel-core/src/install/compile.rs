//! The build step run after a package is unpacked.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::descriptor::PackageDescriptor;
use crate::error::CompileError;

/// Builds an unpacked package in place.
pub trait Compiler: Send + Sync {
    fn compile(&self, desc: &PackageDescriptor, dir: &Path) -> Result<(), CompileError>;
}

/// Skips the build step.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompiler;

impl Compiler for NoopCompiler {
    fn compile(&self, desc: &PackageDescriptor, _dir: &Path) -> Result<(), CompileError> {
        tracing::debug!(package = %desc, "no compile command configured");
        Ok(())
    }
}

/// Build a shell [`Command`] that executes `cmd_str` via the system shell.
///
/// - Unix: `sh -c "{cmd_str}"`
/// - Windows: `cmd /C "{cmd_str}"`
fn shell_command(cmd_str: &str) -> Command {
    #[cfg(windows)]
    {
        let mut c = Command::new("cmd");
        c.args(["/C", cmd_str]);
        c
    }
    #[cfg(not(windows))]
    {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_str);
        c
    }
}

/// Runs a shell command in the package directory.
///
/// The environment carries `PARCEL_PACKAGE_NAME`, `PARCEL_PACKAGE_VERSION`
/// and `PARCEL_PACKAGE_DIR`. Output is streamed to the terminal.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command: String,
}

impl CommandCompiler {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, desc: &PackageDescriptor, dir: &Path) -> Result<(), CompileError> {
        let failed = |exit_code| CompileError {
            package: desc.full_name(),
            command: self.command.clone(),
            exit_code,
        };

        tracing::info!(package = %desc, command = %self.command, "compiling");
        let status = shell_command(&self.command)
            .current_dir(dir)
            .env("PARCEL_PACKAGE_NAME", desc.name())
            .env("PARCEL_PACKAGE_VERSION", desc.version().to_string())
            .env("PARCEL_PACKAGE_DIR", dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| {
                tracing::warn!(package = %desc, error = %e, "could not start compile command");
                failed(None)
            })?;

        if !status.success() {
            return Err(failed(status.code()));
        }
        Ok(())
    }
}
