//! Stage 1: comment stripping, `.include` splicing, origin tagging.
//!
//! Grounded on the character-by-character scanning loop the teacher's older
//! tokenizer used for escape-aware string handling, retargeted here at
//! comment detection instead of token production.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use asm_support::origin::{Origin, UnitPath};

use crate::error::{AssembleError, ErrorKind};
use crate::line::Line;
use crate::module_manager::{ModuleManager, MAX_INCLUDE_DEPTH};

/// Strips a trailing `;` or `//` line comment, respecting single- and
/// double-quoted string literals with backslash escapes. Does not handle
/// `/* */` block comments; those are stripped beforehand over the whole
/// file by [`strip_block_comments`].
fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_string: Option<u8> = None;
    let mut escaped = false;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];

        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == b'\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        match c {
            b'\'' | b'"' => {
                in_string = Some(c);
                i += 1;
            }
            b';' => return &line[..i],
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => return &line[..i],
            _ => i += 1,
        }
    }
    line
}

/// Removes `/* ... */` block comments from the whole source text while
/// preserving every newline they span, so line numbers of text after the
/// comment are unaffected.
fn strip_block_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.char_indices().peekable();
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    while let Some((_, c)) = chars.next() {
        if let Some(quote) = in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }

        if c == '\'' || c == '"' {
            in_string = Some(c);
            out.push(c);
            continue;
        }

        if c == '/' && matches!(chars.peek(), Some((_, '*'))) {
            chars.next();
            loop {
                match chars.next() {
                    None => break,
                    Some((_, '\n')) => out.push('\n'),
                    Some((_, '*')) if matches!(chars.peek(), Some((_, '/'))) => {
                        chars.next();
                        break;
                    }
                    Some(_) => {}
                }
            }
            continue;
        }

        out.push(c);
    }

    out
}

fn parse_include_target(rest: &str) -> Option<&str> {
    let rest = rest.trim();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(&rest[..end])
}

struct Preprocessor<'a> {
    module_manager: &'a ModuleManager,
    errors: Vec<AssembleError>,
}

impl<'a> Preprocessor<'a> {
    fn process_file(&mut self, raw_source: &str, unit_path: UnitPath, depth: usize, lines_out: &mut Vec<Line>) {
        if depth > MAX_INCLUDE_DEPTH {
            self.errors.push(AssembleError::new(ErrorKind::Structure, None, "Include recursion too deep"));
            return;
        }

        let stripped = strip_block_comments(raw_source);

        for (idx, raw_line) in stripped.lines().enumerate() {
            let line_number = idx + 1;
            let code = strip_line_comment(raw_line);
            let origin = Origin::top_level(unit_path.clone(), line_number, Rc::from(raw_line.trim_end_matches('\r')));

            let trimmed = code.trim_start();
            let lower = trimmed.to_ascii_lowercase();

            if lower.starts_with(".include") {
                let rest = &trimmed[".include".len()..];
                match parse_include_target(rest) {
                    Some(target) => self.splice_include(target, &unit_path, depth, &origin, lines_out),
                    None => self.errors.push(AssembleError::at(
                        ErrorKind::Syntax,
                        &origin,
                        "Malformed .include directive: expected a quoted path",
                    )),
                }
                continue;
            }

            lines_out.push(Line::new(code.trim_end_matches('\r').to_string(), origin));
        }
    }

    fn splice_include(&mut self, target: &str, including_unit: &UnitPath, depth: usize, origin: &Origin, lines_out: &mut Vec<Line>) {
        let caller_dir = including_unit.as_path().parent();
        let resolved = match self.module_manager.resolve_include_path(caller_dir, Path::new(target)) {
            Ok(path) => path,
            Err(e) => {
                self.errors.push(AssembleError::at(ErrorKind::Io, origin, format!("Could not resolve include \"{}\": {}", target, e)));
                return;
            }
        };

        let text = match std::fs::read_to_string(&resolved) {
            Ok(text) => text,
            Err(e) => {
                self.errors.push(AssembleError::at(ErrorKind::Io, origin, format!("Could not read include \"{}\": {}", resolved.display(), e)));
                return;
            }
        };

        let included_unit = UnitPath::new(resolved);
        self.process_file(&text, included_unit, depth + 1, lines_out);
    }
}

/// Runs the preprocessor over `source`, attributed to `source_path` (or a
/// synthetic in-memory path when the caller has none).
pub fn preprocess(source: &str, source_path: Option<&Path>, module_manager: &ModuleManager) -> (Vec<Line>, Vec<AssembleError>) {
    let unit_path = match source_path {
        Some(p) => UnitPath::new(p.canonicalize().unwrap_or_else(|_| p.to_path_buf())),
        None => UnitPath::new(PathBuf::from("<memory>")),
    };

    let mut lines = Vec::new();
    let mut preprocessor = Preprocessor { module_manager, errors: Vec::new() };
    preprocessor.process_file(source, unit_path, 0, &mut lines);

    (lines, preprocessor.errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_comments_outside_strings() {
        assert_eq!(strip_line_comment("MVI A, 1 ; load one"), "MVI A, 1 ");
        assert_eq!(strip_line_comment("DB \"a;b\" ; trailing"), "DB \"a;b\" ");
        assert_eq!(strip_line_comment("NOP // also a comment"), "NOP ");
    }

    #[test]
    fn strips_block_comments_preserving_newlines() {
        let src = "A\n/* one\ntwo */B";
        let stripped = strip_block_comments(src);
        assert_eq!(stripped, "A\n\nB");
    }

    #[test]
    fn preprocess_simple_source_has_no_includes() {
        let module_manager = ModuleManager::new(vec![]);
        let (lines, errors) = preprocess("MVI A, 1\nHLT\n", None, &module_manager);
        assert!(errors.is_empty());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text.trim(), "MVI A, 1");
        assert_eq!(lines[1].origin.line, 2);
    }
}
