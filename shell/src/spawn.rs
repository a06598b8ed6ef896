//! Process creation for a single pipeline stage.
//!
//! `spawn` is the parent's half of `fork`: it returns once, with a handle.
//! The child's half lives in `exec_child`, which never returns: it either
//! becomes the target program or exits with `EXIT_FAILURE`.

use std::ffi::{CStr, CString};
use std::os::unix::io::RawFd;
use std::ptr;

use libc::{c_char, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd::{self, ForkResult};
use tracing::debug;

use crate::error::{Error, Result};
use crate::job::{Process, FAILURE_CODE};
use crate::types::Stage;

const DIAGNOSTIC_PREFIX: &str = "pipewright";

/// Everything `execvp` needs, built before forking so the child does not
/// allocate.
#[derive(Debug)]
pub struct ExecImage {
	argv: Vec<CString>,
	argv_ptrs: Vec<*const c_char>,
	prefix: Vec<u8>,
	borrowed: Vec<RawFd>,
}

impl ExecImage {
	pub fn new(stage: &Stage) -> Result<ExecImage> {
		let argv = stage.argv()
			.iter()
			.map(|arg| CString::new(arg.as_bytes()))
			.collect::<std::result::Result<Vec<CString>, _>>()?;
		let mut argv_ptrs: Vec<*const c_char> = argv.iter().map(|arg| arg.as_ptr()).collect();
		argv_ptrs.push(ptr::null());
		let prefix = format!("{}: {}: ", DIAGNOSTIC_PREFIX, stage.program()).into_bytes();
		Ok(ExecImage { argv, argv_ptrs, prefix, borrowed: vec![] })
	}

	/// Descriptors the child closes once its own stdin and stdout are in
	/// place. Standard streams in the list are left alone.
	pub fn close_in_child(&mut self, fds: &[RawFd]) {
		self.borrowed = fds.iter().copied().filter(|&fd| fd > STDERR_FILENO).collect();
	}

	pub fn program(&self) -> &CStr {
		&self.argv[0]
	}

	fn die(&self, errno: Errno) -> ! {
		let reason = match errno {
			Errno::ENOENT => "command not found",
			e => e.desc(),
		};
		unsafe {
			libc::write(STDERR_FILENO, self.prefix.as_ptr().cast(), self.prefix.len());
			libc::write(STDERR_FILENO, reason.as_ptr().cast(), reason.len());
			libc::write(STDERR_FILENO, b"\n".as_ptr().cast(), 1);
			libc::_exit(FAILURE_CODE)
		}
	}
}

fn install(fd: RawFd, target: RawFd) -> nix::Result<()> {
	if fd != target {
		unistd::dup2(fd, target)?;
		if fd > STDERR_FILENO {
			let _ = unistd::close(fd);
		}
	}
	Ok(())
}

fn exec_child(image: &ExecImage, input: RawFd, output: RawFd) -> ! {
	// The Rust runtime ignores SIGPIPE and exec would keep that disposition.
	let _ = unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) };

	if let Err(e) = install(input, STDIN_FILENO).and_then(|_| install(output, STDOUT_FILENO)) {
		image.die(e);
	}
	// Caller descriptors that are not close-on-exec would otherwise reach
	// every stage and hold pipes open.
	for &fd in &image.borrowed {
		let _ = unistd::close(fd);
	}
	unsafe {
		libc::execvp(image.argv_ptrs[0], image.argv_ptrs.as_ptr());
	}
	image.die(Errno::last())
}

/// Forks a process running `image` with `input` as its stdin and `output` as
/// its stdout.
///
/// Exec failures are not reported here; the child exits with
/// `EXIT_FAILURE` and the caller sees it when the process is reaped.
pub fn spawn(image: &ExecImage, input: RawFd, output: RawFd) -> Result<Process> {
	match unsafe { unistd::fork() }.map_err(Error::Fork)? {
		ForkResult::Parent { child } => {
			debug!(pid = %child, program = ?image.program(), input, output, "spawned");
			Ok(Process::new(child))
		},
		ForkResult::Child => exec_child(image, input, output),
	}
}

/// Builds the image for `stage` and spawns it.
pub fn spawn_stage(stage: &Stage, input: RawFd, output: RawFd) -> Result<Process> {
	let image = ExecImage::new(stage)?;
	spawn(&image, input, output)
}
