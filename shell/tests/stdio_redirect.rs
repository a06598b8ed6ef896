//! Single-stage pipelines with file redirections point this process's own
//! stdin/stdout at the files while the child is forked. Everything lives in
//! one test so that the harness never writes while fd 0 and 1 are swapped.

use std::fs;
use std::os::fd::RawFd;
use std::os::unix::fs::MetadataExt;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;

use pipewright::{stdio, Classification, Error, Input, OpenMode, Output, Pipeline, Stage};

fn identity(fd: RawFd) -> (u64, u64) {
	let meta = fs::metadata(format!("/proc/self/fd/{}", fd)).unwrap();
	(meta.dev(), meta.ino())
}

fn stage(argv: &[&str]) -> Stage {
	Stage::new(argv.iter().copied()).unwrap()
}

fn no_children_left() -> bool {
	waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) == Err(Errno::ECHILD)
}

#[test]
fn single_stage_redirections_restore_stdio() {
	let dir = tempfile::tempdir().unwrap();
	let before = (identity(0), identity(1));

	// cat < in.txt > out.txt
	let input = dir.path().join("in.txt");
	let output = dir.path().join("out.txt");
	fs::write(&input, "b\na\n").unwrap();
	let pipeline = Pipeline::new(vec![stage(&["cat"])])
		.with_input(Input::File(input.clone()))
		.with_output(Output::File { path: output.clone(), mode: OpenMode::Truncate });
	let job = pipewright::run(&pipeline).unwrap();
	assert_eq!(job.classification(), Classification::Success);
	assert_eq!(fs::read_to_string(&output).unwrap(), "b\na\n");
	assert_eq!((identity(0), identity(1)), before);

	// echo >> out.txt, twice
	for word in ["one", "two"] {
		let pipeline = Pipeline::new(vec![stage(&["echo", word])])
			.with_output(Output::File { path: output.clone(), mode: OpenMode::Append });
		let job = pipewright::run(&pipeline).unwrap();
		assert_eq!(job.classification(), Classification::Success);
	}
	assert_eq!(fs::read_to_string(&output).unwrap(), "b\na\none\ntwo\n");
	assert_eq!((identity(0), identity(1)), before);

	// Input only: stdin moves to the file, stdout is saved but untouched.
	let guard = stdio::redirect(Some(&input), None, OpenMode::Truncate).unwrap();
	assert!(guard.redirects_stdin());
	assert_eq!(identity(0), (fs::metadata(&input).unwrap().dev(), fs::metadata(&input).unwrap().ino()));
	assert_eq!(identity(1), before.1);
	drop(guard);
	assert_eq!((identity(0), identity(1)), before);

	let guard = stdio::redirect(None, Some(&output), OpenMode::Append).unwrap();
	assert!(!guard.redirects_stdin());
	drop(guard);
	assert_eq!((identity(0), identity(1)), before);

	// Output in a directory that does not exist: stdin was already swapped
	// when the open failed and must come back.
	let bad = dir.path().join("missing/out.txt");
	match stdio::redirect(Some(&input), Some(&bad), OpenMode::Truncate) {
		Err(Error::Open { path, .. }) => assert_eq!(path, bad),
		other => panic!("expected an open error, got {:?}", other.map(|_| ())),
	}
	assert_eq!((identity(0), identity(1)), before);

	// Missing input: nothing is spawned.
	let pipeline = Pipeline::new(vec![stage(&["cat"])]).with_input(Input::File(dir.path().join("absent.txt")));
	assert!(matches!(pipewright::run(&pipeline), Err(Error::Open { .. })));
	assert!(no_children_left());
	assert_eq!((identity(0), identity(1)), before);

	// A failing command still gets its status through the redirected path.
	let pipeline = Pipeline::new(vec![stage(&["false"])])
		.with_output(Output::File { path: output.clone(), mode: OpenMode::Append });
	let job = pipewright::run(&pipeline).unwrap();
	assert_eq!(job.classification(), Classification::Failure(1));
	assert_eq!((identity(0), identity(1)), before);
}
