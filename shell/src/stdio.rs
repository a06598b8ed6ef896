//! Scoped redirection of the calling process's own standard streams.
//!
//! Only the single-command path uses this: the orchestrator points its own
//! stdin/stdout at the redirection files, spawns the command so it inherits
//! them, and drops the guard to get its terminal back.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

use libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::fcntl::{fcntl, FcntlArg};
use nix::unistd;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::OpenMode;

const CREATE_MODE: u32 = 0o644;

pub(crate) fn open_input(path: &Path) -> Result<File> {
	File::open(path).map_err(|source| Error::Open { path: path.to_owned(), source })
}

pub(crate) fn open_output(path: &Path, mode: OpenMode) -> Result<File> {
	let mut options = OpenOptions::new();
	options.write(true).create(true).mode(CREATE_MODE);
	match mode {
		OpenMode::Truncate => options.truncate(true),
		OpenMode::Append => options.append(true),
	};
	options.open(path).map_err(|source| Error::Open { path: path.to_owned(), source })
}

// The copy is close-on-exec so children never inherit it.
fn backup(fd: RawFd) -> Result<OwnedFd> {
	let copy = fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(0)).map_err(Error::Dup)?;
	Ok(unsafe { OwnedFd::from_raw_fd(copy) })
}

fn replace(file: File, target: RawFd) -> Result<()> {
	unistd::dup2(file.as_raw_fd(), target).map_err(Error::Dup)?;
	Ok(())
}

/// Saved copies of the standard streams, put back on drop.
#[must_use = "the streams are restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct StdioGuard {
	stdin: Option<OwnedFd>,
	stdout: Option<OwnedFd>,
}

impl StdioGuard {
	pub fn redirects_stdin(&self) -> bool {
		self.stdin.is_some()
	}
}

impl Drop for StdioGuard {
	fn drop(&mut self) {
		let _ = io::stdout().flush();
		for (saved, target) in [(self.stdout.take(), STDOUT_FILENO), (self.stdin.take(), STDIN_FILENO)] {
			if let Some(saved) = saved {
				if let Err(e) = unistd::dup2(saved.as_raw_fd(), target) {
					warn!(fd = target, error = %e, "could not restore standard stream");
				}
			}
		}
	}
}

/// Points the process's stdin at `input` and its stdout at `output`.
///
/// Standard output is backed up even when only the input is redirected.
/// If any step fails, whatever was already redirected is restored before the
/// error is returned.
pub fn redirect(input: Option<&Path>, output: Option<&Path>, mode: OpenMode) -> Result<StdioGuard> {
	let _ = io::stdout().flush();
	let mut guard = StdioGuard { stdin: None, stdout: None };

	if let Some(path) = input {
		let file = open_input(path)?;
		guard.stdin = Some(backup(STDIN_FILENO)?);
		replace(file, STDIN_FILENO)?;
		debug!(path = %path.display(), "stdin redirected");
	}

	guard.stdout = Some(backup(STDOUT_FILENO)?);

	if let Some(path) = output {
		let file = open_output(path, mode)?;
		replace(file, STDOUT_FILENO)?;
		debug!(path = %path.display(), ?mode, "stdout redirected");
	}

	Ok(guard)
}
