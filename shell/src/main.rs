use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pipewright::global;
use pipewright::history::History;

const DEFAULT_LOG_FILTER: &str = "pipewright=info";

#[derive(Debug, Parser)]
#[command(name = "pipewright", version, about = "A minimal shell that runs command pipelines")]
struct Args {
	/// File every command line is appended to.
	#[arg(long, value_name = "PATH", default_value = "history.txt")]
	history: PathBuf,

	/// Do not record history.
	#[arg(long)]
	no_history: bool,

	#[arg(long, value_name = "TEXT", default_value = "pipewright$ ")]
	prompt: String,

	/// Run a single command line and exit with its status.
	#[arg(short = 'c', value_name = "COMMAND")]
	command: Option<String>,
}

fn init_tracing() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(io::stderr)
		.with_target(false)
		.without_time()
		.init();
}

fn repl(state: &mut global::State, prompt: &str) {
	let mut stdout = io::stdout();
	let stdin = io::stdin();
	let mut line = String::new();
	while !state.exit_requested() {
		let _ = stdout.write_all(prompt.as_bytes());
		let _ = stdout.flush();
		line.clear();
		match stdin.lock().read_line(&mut line) {
			Ok(0) => break,
			Ok(_) => {},
			Err(e) => {
				eprintln!("pipewright: {}", e);
				break;
			},
		}
		state.record(&line);
		state.execute(&line);
	}
}

fn main() -> ExitCode {
	let args = Args::parse();
	init_tracing();

	let history = if args.no_history {
		None
	} else {
		match History::open(&args.history) {
			Ok(history) => Some(history),
			Err(e) => {
				eprintln!("pipewright: cannot open history file '{}': {}", args.history.display(), e);
				None
			},
		}
	};
	let mut state = global::State::new(history);

	match args.command {
		Some(ref line) => {
			state.record(line);
			state.execute(line);
		},
		None => repl(&mut state, &args.prompt),
	}
	ExitCode::from((state.status() & 0xff) as u8)
}
