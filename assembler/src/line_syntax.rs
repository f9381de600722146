//! Small text-level helpers shared by the macro expander and both
//! generation passes: leading-label detection, comma splitting that
//! respects quotes/parens, and string-literal decoding.
//!
//! Uses the character-scanning style `preprocessor.rs` already established
//! for this pipeline (escape-aware, quote-aware single pass over bytes)
//! rather than building a token-stream tokenizer, since every stage
//! downstream of the preprocessor here works directly on the line's text
//! instead of a pre-tokenized form.

/// A label written at the start of a line, either global (`name:`) or
/// local (`@name:`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadingLabel {
    Global(String),
    Local(String),
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits a single leading `name:` or `@name:` off the front of `text`,
/// returning it along with the remainder of the line (trimmed at the
/// front). Does not match directive-like words that merely contain a
/// colon further in (e.g. it won't misfire on `.text`).
pub fn split_leading_label(text: &str) -> (Option<LeadingLabel>, &str) {
    let trimmed = text.trim_start();
    let is_local = trimmed.starts_with('@');
    let ident_start = if is_local { 1 } else { 0 };
    let mut end = ident_start;
    let bytes = trimmed.as_bytes();
    if end >= bytes.len() || !(bytes[end] as char).is_ascii_alphabetic() && bytes[end] != b'_' {
        return (None, text);
    }
    while end < bytes.len() && is_ident_char(bytes[end] as char) {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b':' {
        let name = &trimmed[ident_start..end];
        let rest = &trimmed[end + 1..];
        let label = if is_local { LeadingLabel::Local(name.to_string()) } else { LeadingLabel::Global(name.to_string()) };
        return (Some(label), rest);
    }
    (None, text)
}

/// Splits `s` on whitespace into the first word and the (trimmed)
/// remainder.
pub fn split_first_word(s: &str) -> (&str, &str) {
    let trimmed = s.trim_start();
    match trimmed.find(char::is_whitespace) {
        Some(idx) => (&trimmed[..idx], trimmed[idx..].trim_start()),
        None => (trimmed, ""),
    }
}

/// Splits `s` into a leading identifier-like word and the remainder,
/// stopping at whitespace or the first character matching `is_delim`
/// (which is *not* consumed, so the caller can inspect it in `rest`).
pub fn split_first_word_by(s: &str, is_delim: impl Fn(char) -> bool) -> (&str, &str) {
    let trimmed = s.trim_start();
    match trimmed.find(|c: char| c.is_whitespace() || is_delim(c)) {
        Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
        None => (trimmed, ""),
    }
}

/// Splits `s` at top-level commas: commas nested inside `(...)`, `[...]`
/// or a quoted string are not split points. Used for macro-call argument
/// lists and for `DB`/`DW`/`.print` argument lists.
pub fn split_top_level_commas(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut cur = String::new();

    for c in s.chars() {
        if let Some(quote) = in_string {
            cur.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                in_string = Some(c);
                cur.push(c);
            }
            '(' | '[' => {
                depth += 1;
                cur.push(c);
            }
            ')' | ']' => {
                depth -= 1;
                cur.push(c);
            }
            ',' if depth <= 0 => {
                parts.push(cur.trim().to_string());
                cur = String::new();
            }
            _ => cur.push(c),
        }
    }
    if !cur.trim().is_empty() || !parts.is_empty() {
        parts.push(cur.trim().to_string());
    }
    parts
}

fn decode_escape(c: char) -> char {
    match c {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        '0' => '\0',
        other => other,
    }
}

/// Decodes a single- or double-quoted string literal starting at the
/// beginning of `s`. Returns the decoded bytes and the number of input
/// characters consumed (including both quotes).
pub fn parse_string_literal(s: &str) -> Result<(Vec<u8>, usize), String> {
    let mut chars = s.chars();
    let quote = match chars.next() {
        Some(q @ ('\'' | '"')) => q,
        _ => return Err("expected a quoted string".to_string()),
    };

    let mut bytes = Vec::new();
    let mut consumed = 1;
    let mut escaped = false;
    for c in chars {
        consumed += 1;
        if escaped {
            let decoded = decode_escape(c);
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(decoded.encode_utf8(&mut buf).as_bytes());
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            c if c == quote => return Ok((bytes, consumed)),
            c => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    Err("unterminated string literal".to_string())
}

/// A line split into its optional leading label, its directive/mnemonic
/// keyword (upper-cased, for case-insensitive matching), and the
/// remaining argument text. Computed once per line and shared by both
/// generation passes so their directive dispatch can never drift apart.
#[derive(Debug, Clone)]
pub struct ParsedLine<'a> {
    pub label: Option<LeadingLabel>,
    pub keyword: String,
    pub args: &'a str,
}

pub fn parse_line(text: &str) -> ParsedLine<'_> {
    let (label, rest) = split_leading_label(text);
    let (keyword, args) = split_first_word(rest);
    ParsedLine { label, keyword: keyword.to_ascii_uppercase(), args }
}

/// True if `s` is a single valid identifier occupying the whole string.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '@' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '@' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_global_and_local_labels() {
        assert_eq!(split_leading_label("start: JMP start").0, Some(LeadingLabel::Global("start".to_string())));
        assert_eq!(split_leading_label("@loop: NOP").0, Some(LeadingLabel::Local("loop".to_string())));
        assert_eq!(split_leading_label(".text \"hi\"").0, None);
    }

    #[test]
    fn commas_respect_quotes_and_parens() {
        let parts = split_top_level_commas("\"a,b\", foo(1,2), 3");
        assert_eq!(parts, vec!["\"a,b\"", "foo(1,2)", "3"]);
    }

    #[test]
    fn string_literal_decodes_escapes() {
        let (bytes, consumed) = parse_string_literal("\"AB\\n\" rest").unwrap();
        assert_eq!(bytes, b"AB\n");
        assert_eq!(consumed, 6);
    }
}
