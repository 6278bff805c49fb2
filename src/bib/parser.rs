// src/bib/parser.rs

//! BibTeX-style entry scanner
//!
//! Produces raw entries (type, id, ordered key/value pairs) without
//! interpreting any keys. Values may be brace-delimited (nested braces and
//! line breaks allowed; `\{`, `\}` and `\\` are literal characters),
//! quote-delimited, or bare tokens. Text outside entries is ignored, so
//! exports with comments and preambles load fine.

use crate::{Error, Result};

/// One entry as written in the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub entry_type: String,
    pub id: String,
    /// Lowercased keys in file order
    pub fields: Vec<(String, String)>,
    /// 1-based line of the `@`
    pub line: usize,
}

struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    file: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, file: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
            file,
        }
    }

    fn next(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.next();
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            file: self.file.to_string(),
            line: self.line,
            message: message.into(),
        }
    }

    /// Read up to (not including) one of the stop characters
    fn read_until(&mut self, stops: &[char]) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.peek() {
                Some(c) if stops.contains(&c) => return Ok(out),
                Some(_) => out.extend(self.next()),
                None => return Err(self.error(format!("unexpected end of file, expected one of {stops:?}"))),
            }
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.next() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of file"))),
        }
    }

    /// Brace-delimited value; the opening brace is already consumed
    fn read_braced(&mut self) -> Result<String> {
        let start = self.line;
        let mut depth = 0usize;
        let mut out = String::new();
        while let Some(c) = self.next() {
            match c {
                // `\{`, `\}` and `\\` stand for the literal character
                '\\' => match self.next() {
                    Some(escaped @ ('{' | '}' | '\\')) => out.push(escaped),
                    Some(other) => {
                        out.push(c);
                        out.push(other);
                    }
                    None => break,
                },
                '{' => {
                    depth += 1;
                    out.push(c);
                }
                '}' if depth == 0 => return Ok(out),
                '}' => {
                    depth -= 1;
                    out.push(c);
                }
                _ => out.push(c),
            }
        }
        Err(Error::Parse {
            file: self.file.to_string(),
            line: start,
            message: "unterminated value".to_string(),
        })
    }

    fn read_quoted(&mut self) -> Result<String> {
        let start = self.line;
        let mut depth = 0usize;
        let mut out = String::new();
        while let Some(c) = self.next() {
            match c {
                '"' if depth == 0 => return Ok(out),
                '{' => {
                    depth += 1;
                    out.push(c);
                }
                '}' => {
                    depth = depth.saturating_sub(1);
                    out.push(c);
                }
                _ => out.push(c),
            }
        }
        Err(Error::Parse {
            file: self.file.to_string(),
            line: start,
            message: "unterminated quoted value".to_string(),
        })
    }

    fn read_value(&mut self) -> Result<String> {
        self.skip_whitespace();
        match self.peek() {
            Some('{') => {
                self.next();
                self.read_braced()
            }
            Some('"') => {
                self.next();
                self.read_quoted()
            }
            Some(_) => Ok(self.read_until(&[',', '}', '\n'])?.trim().to_string()),
            None => Err(self.error("missing value")),
        }
    }

    fn read_entry(&mut self) -> Result<RawEntry> {
        let line = self.line;
        self.expect('@')?;
        let entry_type = self.read_until(&['{', '('])?.trim().to_ascii_lowercase();
        if entry_type.is_empty() {
            return Err(self.error("missing entry type"));
        }
        self.next();

        let id = self.read_until(&[',', '}'])?.trim().to_string();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(self.error(format!("invalid entry id '{id}'")));
        }

        let mut fields: Vec<(String, String)> = Vec::new();
        if self.next() == Some('}') {
            return Ok(RawEntry {
                entry_type,
                id,
                fields,
                line,
            });
        }

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('}') => {
                    self.next();
                    break;
                }
                Some('@') | None => {
                    return Err(Error::Parse {
                        file: self.file.to_string(),
                        line,
                        message: format!("unterminated entry '{id}'"),
                    });
                }
                _ => {}
            }

            let key = self.read_until(&['=', '}'])?.trim().to_ascii_lowercase();
            if self.peek() != Some('=') || key.is_empty() {
                return Err(self.error(format!("malformed field in entry '{id}'")));
            }
            self.next();

            let value = self.read_value()?;
            if fields.iter().any(|(k, _)| *k == key) {
                return Err(self.error(format!("duplicate field '{key}' in entry '{id}'")));
            }
            fields.push((key, value));

            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.next();
            }
        }

        Ok(RawEntry {
            entry_type,
            id,
            fields,
            line,
        })
    }
}

/// Scan all entries of a file
///
/// `@comment`, `@preamble` and `@string` blocks are skipped.
pub fn parse_entries(text: &str, file: &str) -> Result<Vec<RawEntry>> {
    let mut scanner = Scanner::new(text, file);
    let mut entries = Vec::new();

    loop {
        // Skip free text between entries
        while scanner.peek().is_some_and(|c| c != '@') {
            scanner.next();
        }
        if scanner.peek().is_none() {
            break;
        }

        let line = scanner.line;
        let mut lookahead = scanner.chars.clone();
        lookahead.next();
        let kind: String = lookahead.take_while(|c| c.is_ascii_alphabetic()).collect();
        if matches!(kind.to_ascii_lowercase().as_str(), "comment" | "preamble" | "string") {
            scanner.next();
            scanner.read_until(&['{', '('])?;
            scanner.next();
            scanner.read_braced().map_err(|_| Error::Parse {
                file: file.to_string(),
                line,
                message: format!("unterminated @{kind} block"),
            })?;
            continue;
        }

        entries.push(scanner.read_entry()?);
    }

    Ok(entries)
}
