use std::os::unix::io::RawFd;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// One executable invocation: `argv[0]` is looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
	argv: Vec<String>,
}

impl Stage {
	pub fn new<I, S>(argv: I) -> Result<Stage>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
		if argv.is_empty() {
			return Err(Error::InvalidArgument("empty command"));
		}
		Ok(Stage { argv })
	}

	pub fn program(&self) -> &str {
		&self.argv[0]
	}

	pub fn argv(&self) -> &[String] {
		&self.argv
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
	#[default]
	Truncate,
	Append,
}

/// Where the first stage reads from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Input {
	#[default]
	Inherit,
	File(PathBuf),
	/// A descriptor owned by the caller. It is never closed by the engine,
	/// and only the first stage keeps it open.
	Fd(RawFd),
}

/// Where the last stage writes to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Output {
	#[default]
	Inherit,
	File { path: PathBuf, mode: OpenMode },
	/// A descriptor owned by the caller. It is never closed by the engine,
	/// and only the last stage keeps it open.
	Fd(RawFd),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pipeline {
	pub stages: Vec<Stage>,
	pub input: Input,
	pub output: Output,
}

impl Pipeline {
	pub fn new(stages: Vec<Stage>) -> Pipeline {
		Pipeline { stages, input: Input::Inherit, output: Output::Inherit }
	}

	pub fn with_input(mut self, input: Input) -> Pipeline {
		self.input = input;
		self
	}

	pub fn with_output(mut self, output: Output) -> Pipeline {
		self.output = output;
		self
	}

	pub fn len(&self) -> usize {
		self.stages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.stages.is_empty()
	}

	/// Whether either boundary names a file rather than a descriptor.
	pub fn has_file_redirect(&self) -> bool {
		matches!(self.input, Input::File(_)) || matches!(self.output, Output::File { .. })
	}
}
