//! Single classification point for every line shape pass 1 and pass 2
//! must agree on. Both passes call [`classify`] and then dispatch on the
//! same [`Stmt`], so their directive handling can never quietly diverge -
//! the round-trip property between passes depends on that.

use crate::line_syntax::{self, LeadingLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataUnit {
    Byte,
    Word,
    Text,
}

#[derive(Debug, Clone)]
pub enum Stmt<'a> {
    Blank,
    /// `NAME = expr` or `NAME EQU expr`.
    Assignment { name: String, expr: &'a str },
    /// `NAME .var expr`: declares (or, if already declared, silently
    /// re-declares) a reassignable variable.
    VarDecl { name: String, expr: &'a str },
    If { expr: &'a str },
    EndIf,
    Print { args: &'a str },
    Error { args: &'a str },
    Org { expr: &'a str },
    Align { expr: &'a str },
    Encoding { args: &'a str },
    Incbin { args: &'a str },
    Data { unit: DataUnit, args: &'a str },
    Ds { expr: &'a str },
    Instruction { mnemonic: String, operands: &'a str },
}

#[derive(Debug, Clone)]
pub struct Statement<'a> {
    pub label: Option<LeadingLabel>,
    pub kind: Stmt<'a>,
}

fn parse_assignment_like<'a>(s: &'a str) -> Option<(String, &'static str, &'a str)> {
    let (name, after) = line_syntax::split_first_word(s);
    if name.is_empty() || !line_syntax::is_identifier(name) || name.starts_with('@') || name.starts_with('.') {
        return None;
    }

    if let Some(stripped) = after.strip_prefix('=') {
        if !stripped.starts_with('=') {
            return Some((name.to_string(), "=", stripped.trim_start()));
        }
        return None;
    }

    let (second, rest2) = line_syntax::split_first_word(after);
    if second.eq_ignore_ascii_case("equ") {
        return Some((name.to_string(), "equ", rest2));
    }
    if second.eq_ignore_ascii_case(".var") {
        return Some((name.to_string(), ".var", rest2));
    }
    None
}

/// Parses a single post-expansion line into its leading label (if any)
/// and its statement shape.
pub fn classify(text: &str) -> Statement<'_> {
    let (label, rest) = line_syntax::split_leading_label(text);
    let trimmed = rest.trim();

    if trimmed.is_empty() {
        return Statement { label, kind: Stmt::Blank };
    }

    if let Some((name, op, expr)) = parse_assignment_like(trimmed) {
        let kind = if op == ".var" { Stmt::VarDecl { name, expr } } else { Stmt::Assignment { name, expr } };
        return Statement { label, kind };
    }

    let (keyword_raw, args) = line_syntax::split_first_word(trimmed);
    let keyword = keyword_raw.to_ascii_uppercase();

    let kind = match keyword.as_str() {
        ".IF" => Stmt::If { expr: args },
        ".ENDIF" => Stmt::EndIf,
        ".PRINT" => Stmt::Print { args },
        ".ERROR" => Stmt::Error { args },
        ".ORG" | "ORG" => Stmt::Org { expr: args },
        ".ALIGN" | "ALIGN" => Stmt::Align { expr: args },
        ".ENCODING" => Stmt::Encoding { args },
        ".INCBIN" => Stmt::Incbin { args },
        "DB" | ".BYTE" => Stmt::Data { unit: DataUnit::Byte, args },
        "DW" | ".WORD" => Stmt::Data { unit: DataUnit::Word, args },
        ".TEXT" => Stmt::Data { unit: DataUnit::Text, args },
        "DS" => Stmt::Ds { expr: args },
        _ => Stmt::Instruction { mnemonic: keyword, operands: args },
    };

    Statement { label, kind }
}

/// Directives on which a leading label is forbidden.
pub fn forbids_label(kind: &Stmt) -> bool {
    matches!(kind, Stmt::If { .. } | Stmt::EndIf | Stmt::Print { .. } | Stmt::Error { .. } | Stmt::VarDecl { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_var_declaration_shape_name_then_dot_var() {
        let stmt = classify("val .var 0");
        assert!(matches!(stmt.kind, Stmt::VarDecl { ref name, expr } if name == "val" && expr == "0"));
    }

    #[test]
    fn recognises_plain_assignment_and_equ() {
        assert!(matches!(classify("N = 3").kind, Stmt::Assignment { ref name, expr } if name == "N" && expr == "3"));
        assert!(matches!(classify("N EQU 3").kind, Stmt::Assignment { ref name, expr } if name == "N" && expr == "3"));
    }

    #[test]
    fn recognises_directives_case_insensitively() {
        assert!(matches!(classify(".ORG 0x100").kind, Stmt::Org { expr } if expr == "0x100"));
        assert!(matches!(classify("org 0x100").kind, Stmt::Org { expr } if expr == "0x100"));
        assert!(matches!(classify("align 4").kind, Stmt::Align { expr } if expr == "4"));
    }

    #[test]
    fn falls_back_to_instruction() {
        let stmt = classify("MVI A, 1");
        assert!(matches!(stmt.kind, Stmt::Instruction { ref mnemonic, operands } if mnemonic == "MVI" && operands == "A, 1"));
    }

    #[test]
    fn leading_label_is_split_off() {
        let stmt = classify("start: JMP start");
        assert_eq!(stmt.label, Some(LeadingLabel::Global("start".to_string())));
    }
}
