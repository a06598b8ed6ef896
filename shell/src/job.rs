//! Reaping and exit classification for the processes of one pipeline.
//!
//! Every wait targets a pid this job spawned, never "any child", so jobs do
//! not steal each other's exit statuses.

use std::mem;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

/// Exit code of a child whose exec failed, and the only code treated as
/// failure.
pub const FAILURE_CODE: i32 = libc::EXIT_FAILURE;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
	Running,
	Stopped(Signal),
	Exited(i32),
	Signaled(Signal),
	/// Waiting on the process failed; it is no longer tracked.
	Lost(Errno),
}

impl State {
	pub fn is_terminal(self) -> bool {
		matches!(self, State::Exited(_) | State::Signaled(_) | State::Lost(_))
	}

	pub fn classification(self) -> Option<Classification> {
		match self {
			State::Running | State::Stopped(_) => None,
			State::Exited(FAILURE_CODE) => Some(Classification::Failure(FAILURE_CODE)),
			State::Exited(_) => Some(Classification::Success),
			State::Signaled(sig) => Some(Classification::SignalTerminated(sig)),
			State::Lost(_) => Some(Classification::Failure(FAILURE_CODE)),
		}
	}
}

trait WaitStatusExt {
	fn state(self) -> Option<State>;
}

impl WaitStatusExt for WaitStatus {
	fn state(self) -> Option<State> {
		match self {
			WaitStatus::Exited(_, code) => Some(State::Exited(code)),
			WaitStatus::Signaled(_, sig, _) => Some(State::Signaled(sig)),
			WaitStatus::Stopped(_, sig) => Some(State::Stopped(sig)),
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceEvent(_, sig, _) => Some(State::Stopped(sig)),
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceSyscall(_) => Some(State::Stopped(Signal::SIGTRAP)),
			WaitStatus::Continued(_) => Some(State::Running),
			WaitStatus::StillAlive => None,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Classification {
	Success,
	Failure(i32),
	/// Killed by a signal. Not a failure as far as the pipeline goes.
	SignalTerminated(Signal),
}

impl Classification {
	pub fn is_failure(self) -> bool {
		matches!(self, Classification::Failure(_))
	}

	/// Shell style exit status: 128 + signal number for signal deaths.
	pub fn code(self) -> i32 {
		match self {
			Classification::Success => 0,
			Classification::Failure(code) => code,
			Classification::SignalTerminated(sig) => 128 + sig as i32,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pid: Pid,
	state: State,
}

impl Process {
	pub fn new(pid: Pid) -> Process {
		Process { pid, state: State::Running }
	}

	pub fn pid(&self) -> Pid {
		self.pid
	}

	pub fn state(&self) -> State {
		self.state
	}

	pub fn classification(&self) -> Option<Classification> {
		self.state.classification()
	}

	fn transition(&mut self, next: State) {
		let pid = self.pid.as_raw();
		match next {
			State::Exited(code) => debug!(pid, code, "reaped"),
			State::Signaled(sig) => debug!(pid, signal = ?sig, "terminated by signal"),
			State::Stopped(sig) => info!(pid, signal = ?sig, "stopped"),
			State::Running if matches!(self.state, State::Stopped(_)) => info!(pid, "continued"),
			State::Lost(e) => warn!(pid, error = %e, "wait failed"),
			State::Running => {},
		}
		self.state = next;
	}

	/// Checks on the process without blocking. Returns true once it is
	/// terminal.
	fn poll(&mut self) -> bool {
		let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
		loop {
			match waitpid(self.pid, Some(flags)) {
				Ok(status) => {
					if let Some(next) = status.state() {
						self.transition(next);
					}
					return self.state.is_terminal();
				},
				Err(Errno::EINTR) => continue,
				Err(e) => {
					self.transition(State::Lost(e));
					return true;
				},
			}
		}
	}

	/// Blocks until the process is terminal. Stops and continues are
	/// reported and waiting resumes.
	fn wait(&mut self) {
		let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
		while !self.state.is_terminal() {
			match waitpid(self.pid, Some(flags)) {
				Ok(status) => {
					if let Some(next) = status.state() {
						self.transition(next);
					}
				},
				Err(Errno::EINTR) => {},
				Err(e) => self.transition(State::Lost(e)),
			}
		}
	}
}

/// The stages of a finished pipeline, in spawn order.
#[derive(Debug)]
pub struct Job {
	processes: Vec<Process>,
}

impl Job {
	pub fn processes(&self) -> &[Process] {
		&self.processes
	}

	pub fn reaped(&self) -> usize {
		self.processes.iter().filter(|pr| pr.state.is_terminal()).count()
	}

	/// Index of the earliest stage classified as a failure.
	pub fn failed_stage(&self) -> Option<usize> {
		self.processes.iter().position(|pr| pr.classification().is_some_and(Classification::is_failure))
	}

	/// The earliest failure if there is one, otherwise how the last stage
	/// ended.
	///
	/// A last stage killed by a signal gives `SignalTerminated` rather than
	/// `Success`. Neither is a failure, so callers that only care about
	/// success should test `!is_failure()` instead of matching `Success`.
	pub fn classification(&self) -> Classification {
		let decisive = match self.failed_stage() {
			Some(i) => self.processes.get(i),
			None => self.processes.last(),
		};
		decisive.and_then(Process::classification).unwrap_or(Classification::Success)
	}
}

/// Collects processes while a pipeline is being built.
///
/// Dropping the builder reaps whatever is still outstanding, so no exit path
/// leaves zombies behind.
#[derive(Debug)]
pub struct JobBuilder {
	imp: Job,
}

impl JobBuilder {
	pub fn new(size_hint: usize) -> JobBuilder {
		JobBuilder {
			imp: Job { processes: Vec::with_capacity(size_hint) }
		}
	}

	pub fn push(&mut self, process: Process) {
		self.imp.processes.push(process);
	}

	pub fn len(&self) -> usize {
		self.imp.processes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.imp.processes.is_empty()
	}

	pub fn unreaped(&self) -> usize {
		self.len() - self.imp.reaped()
	}

	/// Reaps stages that already finished, in spawn order, without blocking.
	///
	/// Stops at the first stage that is still running: stages tend to finish
	/// in order, so the rest are unlikely to be done. This only shortens how
	/// long finished stages stay zombies; `reap_all` does not depend on it.
	pub fn reap_finished_so_far(&mut self) -> usize {
		let mut reaped = 0;
		for pr in self.imp.processes.iter_mut().filter(|pr| !pr.state.is_terminal()) {
			if !pr.poll() {
				break;
			}
			reaped += 1;
		}
		reaped
	}

	/// Blocks until every stage is terminal.
	pub fn reap_all(&mut self) -> usize {
		let mut reaped = 0;
		for pr in self.imp.processes.iter_mut().filter(|pr| !pr.state.is_terminal()) {
			pr.wait();
			reaped += 1;
		}
		reaped
	}

	pub fn finish(mut self) -> Job {
		self.reap_all();
		Job { processes: mem::take(&mut self.imp.processes) }
	}
}

impl Drop for JobBuilder {
	fn drop(&mut self) {
		if self.unreaped() > 0 {
			self.reap_all();
		}
	}
}
