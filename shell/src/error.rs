use std::{ffi, io};
use std::path::PathBuf;

/// Errors reported synchronously by the pipeline engine.
///
/// A stage whose executable cannot be started is not an error here: the child
/// exits with `EXIT_FAILURE` and the failure shows up in the stage's
/// classification once it has been reaped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("syntax error: {0}")]
	Syntax(String),

	#[error("invalid argument: {0}")]
	InvalidArgument(&'static str),

	#[error("argument contains a nul byte: {0}")]
	Nul(#[from] ffi::NulError),

	#[error("cannot open '{}': {source}", .path.display())]
	Open {
		path: PathBuf,
		source: io::Error,
	},

	#[error("cannot duplicate descriptor: {0}")]
	Dup(#[source] nix::Error),

	#[error("cannot create pipe: {0}")]
	Pipe(#[source] nix::Error),

	#[error("fork failed: {0}")]
	Fork(#[source] nix::Error),
}

impl Error {
	pub(crate) fn syntax<S: Into<String>>(msg: S) -> Error {
		Error::Syntax(msg.into())
	}

	/// True for errors raised before any process or descriptor was created.
	pub fn is_structural(&self) -> bool {
		matches!(*self, Error::Syntax(_) | Error::InvalidArgument(_) | Error::Nul(_))
	}
}

pub type Result<T> = std::result::Result<T, Error>;
