use nix::sys::signal::Signal;
use tracing::warn;

use crate::builtin;
use crate::eval;
use crate::history::History;
use crate::job::{Job, State as ProcessState, FAILURE_CODE};
use crate::parser;
use crate::types::Pipeline;

const PROGRAM: &str = "pipewright";
const SYNTAX_STATUS: i32 = 2;

/// Interactive shell state carried from one command line to the next.
#[derive(Debug)]
pub struct State {
	history: Option<History>,
	status: i32,
	exit_requested: bool,
}

impl State {
	pub fn new(history: Option<History>) -> State {
		State { history, status: 0, exit_requested: false }
	}

	pub fn status(&self) -> i32 {
		self.status
	}

	pub fn set_status(&mut self, status: i32) {
		self.status = status;
	}

	pub fn exit_requested(&self) -> bool {
		self.exit_requested
	}

	pub fn request_exit(&mut self) {
		self.exit_requested = true;
	}

	pub fn record(&mut self, line: &str) {
		if let Some(ref mut history) = self.history {
			if let Err(e) = history.append(line) {
				warn!(path = %history.path().display(), error = %e, "could not write history");
			}
		}
	}

	/// Parses and runs one command line, returning its exit status.
	pub fn execute(&mut self, line: &str) -> i32 {
		let pipeline = match parser::parse(line) {
			Ok(Some(pipeline)) => pipeline,
			Ok(None) => return self.status,
			Err(e) => {
				eprintln!("{}: {}", PROGRAM, e);
				self.status = SYNTAX_STATUS;
				return self.status;
			},
		};

		if pipeline.len() == 1 && !pipeline.has_file_redirect() {
			if let Some(func) = builtin::match_builtin(pipeline.stages[0].program()) {
				let status = func(self, pipeline.stages[0].argv());
				self.status = status;
				return status;
			}
		}

		self.status = match eval::run(&pipeline) {
			Ok(job) => {
				report(&pipeline, &job);
				job.classification().code()
			},
			Err(e) => {
				eprintln!("{}: {}", PROGRAM, e);
				FAILURE_CODE
			},
		};
		self.status
	}
}

fn report(pipeline: &Pipeline, job: &Job) {
	for (stage, pr) in pipeline.stages.iter().zip(job.processes()) {
		match pr.state() {
			// Upstream stages routinely die this way once the reader is done.
			ProcessState::Signaled(Signal::SIGPIPE) => {},
			ProcessState::Signaled(sig) => eprintln!("{}: {}: terminated by signal {}", PROGRAM, stage.program(), sig as i32),
			ProcessState::Lost(e) => eprintln!("{}: {}: lost track of process: {}", PROGRAM, stage.program(), e),
			_ => {},
		}
	}
	if let Some(i) = job.failed_stage() {
		if pipeline.len() > 1 {
			let code = job.classification().code();
			eprintln!("{}: stage {} ({}) failed with status {}", PROGRAM, i + 1, pipeline.stages[i].program(), code);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serial_test::serial;

	#[test]
	fn syntax_errors_set_status_two() {
		let mut state = State::new(None);
		assert_eq!(state.execute("ls | | wc"), SYNTAX_STATUS);
		assert_eq!(state.status(), SYNTAX_STATUS);
	}

	#[test]
	fn blank_line_keeps_status() {
		let mut state = State::new(None);
		state.set_status(5);
		assert_eq!(state.execute("\n"), 5);
	}

	#[test]
	#[serial]
	fn exit_builtin_stops_the_loop() {
		let mut state = State::new(None);
		assert_eq!(state.execute("exit 4"), 4);
		assert!(state.exit_requested());
	}

	#[test]
	#[serial]
	fn pipeline_status_follows_classification() {
		let dir = tempfile::tempdir().unwrap();
		let out = dir.path().join("out.txt");
		let mut state = State::new(None);
		assert_eq!(state.execute(&format!("true | false | cat > {}", out.display())), FAILURE_CODE);
		assert_eq!(state.execute(&format!("echo hi | cat >> {}", out.display())), 0);
		assert_eq!(std::fs::read_to_string(&out).unwrap(), "hi\n");
	}

	#[test]
	#[serial]
	fn history_is_recorded() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("history.txt");
		let mut state = State::new(Some(History::open(&path).unwrap()));
		state.record("echo one\n");
		state.record("\n");
		state.record("echo two\n");
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "echo one\necho two\n");
	}
}
