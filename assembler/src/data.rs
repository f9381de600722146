//! Shared parsing for `DB`/`.byte`, `DW`/`.word`, and `.text` argument
//! lists. Both passes call [`parse_items`] so the byte count pass 1
//! computes and the bytes pass 2 actually emits can never disagree.

use crate::directive::DataUnit;
use crate::line_syntax;

#[derive(Debug, Clone)]
pub enum Item {
    Str(String),
    Expr(String),
}

pub fn parse_items(args: &str) -> Result<Vec<Item>, String> {
    let mut items = Vec::new();
    for part in line_syntax::split_top_level_commas(args) {
        let trimmed = part.trim();
        if trimmed.starts_with('\'') || trimmed.starts_with('"') {
            let (bytes, consumed) = line_syntax::parse_string_literal(trimmed)?;
            if consumed != trimmed.chars().count() {
                return Err("unexpected characters after string literal".to_string());
            }
            items.push(Item::Str(String::from_utf8_lossy(&bytes).into_owned()));
        } else {
            items.push(Item::Expr(trimmed.to_string()));
        }
    }
    Ok(items)
}

/// The total byte count `unit`'s items occupy: string literals in
/// `DB`/`.text` expand to one byte per character, and in `DW` to 2 bytes
/// per character (matching the per-character word emission `pass2::emit_data`
/// performs for a string item under `DW`); plain expressions are 1 byte
/// under `DB`/`.text` and 2 under `DW`.
pub fn byte_count(unit: DataUnit, items: &[Item]) -> u32 {
    let per_char = if matches!(unit, DataUnit::Word) { 2 } else { 1 };
    items
        .iter()
        .map(|it| match it {
            Item::Str(s) => s.chars().count() as u32 * per_char,
            Item::Expr(_) => per_char,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_string_bytes_and_one_per_expr() {
        let items = parse_items("\"AB\", 0").unwrap();
        assert_eq!(byte_count(DataUnit::Byte, &items), 3);
    }

    #[test]
    fn word_directive_counts_two_per_argument() {
        let items = parse_items("1, 2, 3").unwrap();
        assert_eq!(byte_count(DataUnit::Word, &items), 6);
    }

    #[test]
    fn word_directive_counts_two_per_character_in_a_string_item() {
        let items = parse_items("\"AB\"").unwrap();
        assert_eq!(byte_count(DataUnit::Word, &items), 4);
    }
}
