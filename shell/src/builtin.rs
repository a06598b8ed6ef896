use std::env;
use std::path::PathBuf;

use crate::global;
use crate::job::FAILURE_CODE;

pub type Builtin = fn(&mut global::State, &[String]) -> i32;

fn home() -> Option<PathBuf> {
	env::var_os("HOME").map(PathBuf::from)
}

fn cd_target(arg: Option<&str>) -> Result<PathBuf, &'static str> {
	match arg {
		None | Some("~") => home().ok_or("HOME is not set"),
		Some(dir) => match dir.strip_prefix("~/") {
			Some(rest) => home().map(|h| h.join(rest)).ok_or("HOME is not set"),
			None => Ok(PathBuf::from(dir)),
		},
	}
}

pub fn builtin_cd(_: &mut global::State, argv: &[String]) -> i32 {
	let target = match cd_target(argv.get(1).map(String::as_str)) {
		Ok(target) => target,
		Err(msg) => {
			eprintln!("cd: {}", msg);
			return FAILURE_CODE;
		},
	};
	match env::set_current_dir(&target) {
		Ok(()) => 0,
		Err(e) => {
			eprintln!("cd: {}: {}", target.display(), e);
			FAILURE_CODE
		},
	}
}

pub fn builtin_exit(state: &mut global::State, argv: &[String]) -> i32 {
	state.request_exit();
	match argv.get(1) {
		None => state.status(),
		Some(code) => code.parse().unwrap_or_else(|_| {
			eprintln!("exit: {}: numeric argument required", code);
			2
		}),
	}
}

pub fn match_builtin(name: &str) -> Option<Builtin> {
	match name {
		"cd" => Some(builtin_cd),
		"exit" => Some(builtin_exit),
		_ => None,
	}
}
