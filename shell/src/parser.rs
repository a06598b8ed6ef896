use crate::error::{Error, Result};
use crate::redirect::{self, RedirectKind};
use crate::types::*;

pub const STAGE_DELIMITER: char = '|';

struct Lexer<'a> {
	line: &'a str,
	i: usize,
}

impl<'a> Lexer<'a> {
	fn peek(&self) -> Option<u8> {
		self.line.as_bytes().get(self.i).copied()
	}

	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.peek() {
			if !f(c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		matches!(c, b' ' | b'\t' | b'\n' | b'\r')
	}

	fn is_letter(c: u8) -> bool {
		match c {
			b'<' | b'>' => false,
			_ => !Lexer::is_whitespace(c),
		}
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Lexer::is_whitespace);
	}

	// Operators are ASCII, so every slice boundary lands on a char boundary.
	fn read_word(&mut self) -> &'a str {
		let orig = self.i;
		self.proceed_while(Lexer::is_letter);
		&self.line[orig .. self.i]
	}

	fn read_operator(&mut self) -> Option<&'a str> {
		let orig = self.i;
		match self.peek() {
			Some(b'<') => self.i += 1,
			Some(b'>') => {
				self.i += 1;
				if self.peek() == Some(b'>') {
					self.i += 1;
				}
			},
			_ => return None,
		}
		Some(&self.line[orig .. self.i])
	}
}

/// Splits a command line into stage groups on the exact `|` delimiter.
pub fn split_stages(line: &str) -> Vec<&str> {
	line.split(STAGE_DELIMITER).collect()
}

/// Splits one stage group into whitespace separated tokens.
///
/// Redirection operators become tokens of their own even when they are
/// written against a word, so `sort>out` yields `sort`, `>`, `out`.
pub fn split_args(group: &str) -> Vec<String> {
	let mut lexer = Lexer { line: group, i: 0 };
	let mut tokens: Vec<String> = vec![];
	loop {
		lexer.skip_whitespaces();
		if let Some(op) = lexer.read_operator() {
			tokens.push(op.to_owned());
			continue;
		}
		let word = lexer.read_word();
		if word.is_empty() {
			break;
		}
		tokens.push(word.to_owned());
	}
	tokens
}

/// Parses a command line. A blank line yields `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Pipeline>> {
	if line.trim().is_empty() {
		return Ok(None);
	}

	let mut groups: Vec<Vec<String>> = split_stages(line).into_iter().map(split_args).collect();
	if groups.iter().any(Vec::is_empty) {
		return Err(Error::syntax("empty command"));
	}

	let redirects = redirect::resolve_all(&mut groups)?;
	for group in &groups {
		if let Some(op) = group.iter().find(|t| RedirectKind::from_symbol(t).is_some()) {
			return Err(Error::syntax(format!("misplaced '{}' redirection", op)));
		}
	}

	let stages = groups.into_iter()
		.map(|group| Stage::new(group).map_err(|_| Error::syntax("empty command")))
		.collect::<Result<Vec<Stage>>>()?;

	let mut pipeline = Pipeline::new(stages);
	for r in redirects {
		match r.kind.open_mode() {
			None => pipeline.input = Input::File(r.target),
			Some(mode) => pipeline.output = Output::File { path: r.target, mode },
		}
	}
	Ok(Some(pipeline))
}
