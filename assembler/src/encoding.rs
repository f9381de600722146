//! `.text`-directive character encoding, set via the `.encoding` directive.
//!
//! Tracks the current text encoding ("ascii" or "screencodecommodore")
//! and case-folding mode ("mixed", "lower", "upper") that subsequent
//! `.text` directives use to turn characters into bytes.

use crate::error::{err, AssembleError};
use crate::line_syntax;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharEncoding {
    Ascii,
    ScreenCodeCommodore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseMode {
    Mixed,
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy)]
pub struct EncodingState {
    pub encoding: CharEncoding,
    pub case_mode: CaseMode,
}

impl Default for EncodingState {
    fn default() -> Self {
        Self { encoding: CharEncoding::Ascii, case_mode: CaseMode::Mixed }
    }
}

impl EncodingState {
    /// Applies `.encoding "ascii"|"screencodecommodore" [, "mixed"|"lower"|"upper"]`.
    pub fn apply_directive(&mut self, args: &str, origin: &asm_support::origin::Origin) -> Result<(), AssembleError> {
        let parts = line_syntax::split_top_level_commas(args);
        let encoding_str = parts.first().ok_or_else(|| err!(Syntax, origin, ".encoding requires an encoding name"))?;
        let (bytes, _) = line_syntax::parse_string_literal(encoding_str.trim())
            .map_err(|e| err!(Syntax, origin, "Invalid .encoding argument: {}", e))?;
        let name = String::from_utf8_lossy(&bytes).to_ascii_lowercase();
        self.encoding = match name.as_str() {
            "ascii" => CharEncoding::Ascii,
            "screencodecommodore" => CharEncoding::ScreenCodeCommodore,
            other => return Err(err!(Syntax, origin, "Unknown text encoding '{}'", other)),
        };

        if let Some(mode_str) = parts.get(1) {
            let (bytes, _) = line_syntax::parse_string_literal(mode_str.trim())
                .map_err(|e| err!(Syntax, origin, "Invalid .encoding case mode: {}", e))?;
            let mode = String::from_utf8_lossy(&bytes).to_ascii_lowercase();
            self.case_mode = match mode.as_str() {
                "mixed" => CaseMode::Mixed,
                "lower" => CaseMode::Lower,
                "upper" => CaseMode::Upper,
                other => return Err(err!(Syntax, origin, "Unknown text case mode '{}'", other)),
            };
        }

        Ok(())
    }

    /// Encodes a single character to its byte value under the current
    /// encoding and case mode.
    pub fn encode_char(&self, c: char) -> u8 {
        let folded = match self.case_mode {
            CaseMode::Mixed => c,
            CaseMode::Lower => c.to_ascii_lowercase(),
            CaseMode::Upper => c.to_ascii_uppercase(),
        };

        match self.encoding {
            CharEncoding::Ascii => folded as u8,
            CharEncoding::ScreenCodeCommodore => screen_code(folded),
        }
    }
}

/// Approximates the Commodore PETSCII "screen code" mapping: `@`..`Z`
/// occupy 0x00-0x1A, digits and punctuation pass through their ASCII
/// value, everything else falls back to its low byte.
fn screen_code(c: char) -> u8 {
    match c {
        '@' => 0x00,
        'A'..='Z' => (c as u8) - b'A' + 1,
        'a'..='z' => (c.to_ascii_uppercase() as u8) - b'A' + 1,
        ' '..='?' => c as u8,
        other => other as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asm_support::origin::{Origin, UnitPath};
    use std::rc::Rc;

    fn origin() -> Origin {
        Origin::top_level(UnitPath::new("<test>".into()), 1, Rc::from(""))
    }

    #[test]
    fn default_is_ascii_mixed_case() {
        let state = EncodingState::default();
        assert_eq!(state.encode_char('A'), b'A');
        assert_eq!(state.encode_char('a'), b'a');
    }

    #[test]
    fn encoding_directive_switches_mode() {
        let mut state = EncodingState::default();
        state.apply_directive("\"ascii\", \"upper\"", &origin()).unwrap();
        assert_eq!(state.encode_char('a'), b'A');
    }

    #[test]
    fn unknown_encoding_name_is_rejected() {
        let mut state = EncodingState::default();
        assert!(state.apply_directive("\"bogus\"", &origin()).is_err());
    }
}
