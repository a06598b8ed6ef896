use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;

use libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::fcntl::OFlag;
use nix::unistd;
use tracing::{debug, debug_span, warn};

use crate::error::{Error, Result};
use crate::job::{Job, JobBuilder};
use crate::spawn::{spawn, ExecImage};
use crate::stdio;
use crate::types::*;

/// A boundary descriptor: either the caller's, left open, or one the engine
/// opened and closes on drop.
#[derive(Debug)]
enum Endpoint {
	Borrowed(RawFd),
	Owned(OwnedFd),
}

impl AsRawFd for Endpoint {
	fn as_raw_fd(&self) -> RawFd {
		match *self {
			Endpoint::Borrowed(fd) => fd,
			Endpoint::Owned(ref fd) => fd.as_raw_fd(),
		}
	}
}

fn open_input(input: &Input) -> Result<Endpoint> {
	Ok(match *input {
		Input::Inherit => Endpoint::Borrowed(STDIN_FILENO),
		Input::Fd(fd) => Endpoint::Borrowed(fd),
		Input::File(ref path) => Endpoint::Owned(stdio::open_input(path)?.into()),
	})
}

fn open_output(output: &Output) -> Result<Endpoint> {
	Ok(match *output {
		Output::Inherit => Endpoint::Borrowed(STDOUT_FILENO),
		Output::Fd(fd) => Endpoint::Borrowed(fd),
		Output::File { ref path, mode } => Endpoint::Owned(stdio::open_output(path, mode)?.into()),
	})
}

/// Checks the pipeline and prepares every stage's exec image. Nothing is
/// opened or spawned here.
fn validate(pipeline: &Pipeline) -> Result<Vec<ExecImage>> {
	if pipeline.is_empty() {
		return Err(Error::InvalidArgument("empty pipeline"));
	}
	match (&pipeline.input, &pipeline.output) {
		(&Input::Fd(fd), _) if fd < 0 => return Err(Error::InvalidArgument("negative input descriptor")),
		(_, &Output::Fd(fd)) if fd < 0 => return Err(Error::InvalidArgument("negative output descriptor")),
		(&Input::Fd(STDOUT_FILENO), _) => return Err(Error::InvalidArgument("input descriptor is standard output")),
		(_, &Output::Fd(STDIN_FILENO)) => return Err(Error::InvalidArgument("output descriptor is standard input")),
		(&Input::Fd(i), &Output::Fd(o)) if i == o => return Err(Error::InvalidArgument("input and output are the same descriptor")),
		_ => {},
	}
	let mut images = pipeline.stages.iter().map(ExecImage::new).collect::<Result<Vec<ExecImage>>>()?;
	let borrowed = borrowed_fds(pipeline);
	for image in &mut images {
		image.close_in_child(&borrowed);
	}
	Ok(images)
}

fn borrowed_fds(pipeline: &Pipeline) -> Vec<RawFd> {
	let mut fds = Vec::with_capacity(2);
	if let Input::Fd(fd) = pipeline.input {
		fds.push(fd);
	}
	if let Output::Fd(fd) = pipeline.output {
		fds.push(fd);
	}
	fds
}

// Single command with a file on either side: point our own stdio at the
// files for as long as it takes to fork.
fn spawn_redirected(image: &ExecImage, pipeline: &Pipeline, job: &mut JobBuilder) -> Result<()> {
	let (input, stdin) = match pipeline.input {
		Input::File(ref path) => (Some(path.as_path()), STDIN_FILENO),
		Input::Fd(fd) => (None, fd),
		Input::Inherit => (None, STDIN_FILENO),
	};
	let (output, stdout, mode): (Option<&Path>, RawFd, OpenMode) = match pipeline.output {
		Output::File { ref path, mode } => (Some(path.as_path()), STDOUT_FILENO, mode),
		Output::Fd(fd) => (None, fd, OpenMode::default()),
		Output::Inherit => (None, STDOUT_FILENO, OpenMode::default()),
	};

	let guard = stdio::redirect(input, output, mode)?;
	let spawned = spawn(image, stdin, stdout);
	drop(guard);
	job.push(spawned?);
	Ok(())
}

fn spawn_chain(images: &[ExecImage], input: Endpoint, output: Endpoint, job: &mut JobBuilder) -> Result<()> {
	let (last, upstream) = match images.split_last() {
		Some(split) => split,
		None => return Err(Error::InvalidArgument("empty pipeline")),
	};

	let mut current = input;
	for image in upstream {
		let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(Error::Pipe)?;
		debug!(read = read.as_raw_fd(), write = write.as_raw_fd(), "pipe created");
		job.push(spawn(image, current.as_raw_fd(), write.as_raw_fd())?);
		// The child has its own copy; ours would keep the reader from seeing EOF.
		drop(write);
		current = Endpoint::Owned(read);
		job.reap_finished_so_far();
	}
	job.push(spawn(last, current.as_raw_fd(), output.as_raw_fd())?);
	Ok(())
}

/// Runs `pipeline` to completion and returns its reaped stages.
///
/// Structural problems are reported before anything is opened or spawned.
/// If a pipe or fork fails part way, stages already started are left to
/// finish and are reaped before the error is returned.
pub fn run(pipeline: &Pipeline) -> Result<Job> {
	let images = validate(pipeline)?;
	let _span = debug_span!("pipeline", stages = images.len()).entered();
	let mut job = JobBuilder::new(images.len());

	if let [image] = images.as_slice() {
		if pipeline.has_file_redirect() {
			spawn_redirected(image, pipeline, &mut job)?;
			return Ok(job.finish());
		}
	}

	let input = open_input(&pipeline.input)?;
	let output = open_output(&pipeline.output)?;
	match spawn_chain(&images, input, output, &mut job) {
		Ok(()) => Ok(job.finish()),
		Err(e) => {
			warn!(error = %e, spawned = job.len(), "pipeline construction aborted");
			job.reap_all();
			Err(e)
		},
	}
}
