use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only command history.
#[derive(Debug)]
pub struct History {
	file: File,
	path: PathBuf,
}

impl History {
	/// Opens `path` for appending, creating it if needed.
	pub fn open<P: AsRef<Path>>(path: P) -> io::Result<History> {
		let path = path.as_ref().to_owned();
		let file = OpenOptions::new().append(true).create(true).open(&path)?;
		Ok(History { file, path })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn append(&mut self, line: &str) -> io::Result<()> {
		let line = line.trim_end_matches(['\n', '\r']);
		if line.trim().is_empty() {
			return Ok(());
		}
		writeln!(self.file, "{}", line)?;
		self.file.flush()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lines_accumulate_across_sessions() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("history.txt");
		{
			let mut h = History::open(&path).unwrap();
			h.append("ls -l\n").unwrap();
			h.append("   \n").unwrap();
		}
		let mut h = History::open(&path).unwrap();
		h.append("sort < a | uniq").unwrap();
		assert_eq!(h.path(), path);
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "ls -l\nsort < a | uniq\n");
	}

	#[test]
	fn unwritable_location() {
		let dir = tempfile::tempdir().unwrap();
		assert!(History::open(dir.path().join("no/such/dir/history.txt")).is_err());
	}
}
