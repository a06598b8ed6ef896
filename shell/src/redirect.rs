//! Redirection resolution over tokenized pipeline stages.
//!
//! Input redirection is only looked for in the first stage and output
//! redirection only in the last one. Resolving a kind removes the operator
//! token and the file name that follows it, so a stage that has been resolved
//! once resolves to nothing the second time.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::types::OpenMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
	Input,
	OutputTruncate,
	OutputAppend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
	First,
	Last,
}

impl RedirectKind {
	/// Resolution order. `>>` goes before `>` so an append is never taken for
	/// a truncating redirection.
	pub const PRECEDENCE: [RedirectKind; 3] =
		[RedirectKind::Input, RedirectKind::OutputAppend, RedirectKind::OutputTruncate];

	pub fn symbol(self) -> &'static str {
		match self {
			RedirectKind::Input => "<",
			RedirectKind::OutputTruncate => ">",
			RedirectKind::OutputAppend => ">>",
		}
	}

	pub fn from_symbol(s: &str) -> Option<RedirectKind> {
		match s.trim() {
			"<" => Some(RedirectKind::Input),
			">" => Some(RedirectKind::OutputTruncate),
			">>" => Some(RedirectKind::OutputAppend),
			_ => None,
		}
	}

	/// The end of the pipeline whose stage may carry this redirection.
	pub fn end(self) -> End {
		match self {
			RedirectKind::Input => End::First,
			RedirectKind::OutputTruncate | RedirectKind::OutputAppend => End::Last,
		}
	}

	pub fn open_mode(self) -> Option<OpenMode> {
		match self {
			RedirectKind::Input => None,
			RedirectKind::OutputTruncate => Some(OpenMode::Truncate),
			RedirectKind::OutputAppend => Some(OpenMode::Append),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
	pub kind: RedirectKind,
	pub target: PathBuf,
}

/// Looks for a single `kind` operator in the eligible stage.
///
/// Returns `Ok(None)` when the operator is absent. On success the operator
/// and its file name are removed from the stage's tokens.
pub fn resolve(stages: &mut [Vec<String>], kind: RedirectKind) -> Result<Option<Redirect>> {
	let stage = match kind.end() {
		End::First => stages.first_mut(),
		End::Last => stages.last_mut(),
	};
	let stage = match stage {
		Some(stage) => stage,
		None => return Ok(None),
	};

	let hits: Vec<usize> = stage.iter()
		.enumerate()
		.filter(|&(_, token)| token.trim() == kind.symbol())
		.map(|(i, _)| i)
		.collect();
	let at = match hits.as_slice() {
		[] => return Ok(None),
		[at] => *at,
		_ => return Err(Error::syntax(format!("more than one '{}' redirection", kind.symbol()))),
	};

	let target = match stage.get(at + 1).map(|t| t.trim()) {
		Some(t) if !t.is_empty() && RedirectKind::from_symbol(t).is_none() => PathBuf::from(t),
		_ => return Err(Error::syntax(format!("missing file name after '{}'", kind.symbol()))),
	};
	stage.drain(at ..= at + 1);
	Ok(Some(Redirect { kind, target }))
}

/// Resolves every kind in precedence order.
///
/// At most one input and one output redirection may be attached to a
/// pipeline, so `>>` together with `>` is rejected.
pub fn resolve_all(stages: &mut [Vec<String>]) -> Result<Vec<Redirect>> {
	let mut found: Vec<Redirect> = Vec::with_capacity(2);
	for kind in RedirectKind::PRECEDENCE {
		if let Some(redirect) = resolve(stages, kind)? {
			if kind.end() == End::Last && found.iter().any(|r| r.kind.end() == End::Last) {
				return Err(Error::syntax("more than one output redirection"));
			}
			found.push(redirect);
		}
	}
	Ok(found)
}
