//! Stage 6: the shared expression tokenizer and recursive-descent evaluator
//! used by `.var`/`=`/`EQU`, `.loop`, `.if`, `.org`, `.align`, and every
//! instruction/data-directive operand.
//!
//! One recursive-descent pass both parses and evaluates an expression;
//! there is no separate AST, following the simpler of the two approaches
//! the design notes allow for.

use asm_support::origin::Origin;

use crate::error::{err, AssembleError};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(i64),
    Ident(String),
    OrOr,
    AndAnd,
    Pipe,
    Caret,
    Amp,
    EqEq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
    LParen,
    RParen,
    Comma,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '@'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '@' || c == '.'
}

fn decode_escape(c: char) -> Option<char> {
    Some(match c {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        '0' => '\0',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        other => other,
    })
}

struct Lexer<'s> {
    chars: std::iter::Peekable<std::str::Chars<'s>>,
    toks: Vec<Tok>,
    /// Whether the most recently emitted token completes a value (a number,
    /// identifier, or closing paren), as opposed to sitting in primary
    /// position. Only `%`'s binary-literal-vs-modulo disambiguation needs
    /// this; every other operator is unambiguous regardless of position.
    last_was_value: bool,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s str) -> Self {
        Self { chars: src.chars().peekable(), toks: Vec::new(), last_was_value: false }
    }

    fn lex(mut self) -> Result<Vec<Tok>, String> {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }

            if c.is_ascii_digit() {
                self.lex_number()?;
                self.last_was_value = true;
                continue;
            }

            if c == '\'' || c == '"' {
                self.lex_char_literal(c)?;
                self.last_was_value = true;
                continue;
            }

            if is_ident_start(c) {
                self.lex_ident();
                self.last_was_value = true;
                continue;
            }

            self.chars.next();
            let tok = match c {
                '|' => {
                    if self.eat('|') {
                        Tok::OrOr
                    } else {
                        Tok::Pipe
                    }
                }
                '&' => {
                    if self.eat('&') {
                        Tok::AndAnd
                    } else {
                        Tok::Amp
                    }
                }
                '^' => Tok::Caret,
                '=' => {
                    if self.eat('=') {
                        Tok::EqEq
                    } else {
                        return Err("expected '==' not a bare '='".to_string());
                    }
                }
                '!' => {
                    if self.eat('=') {
                        Tok::Ne
                    } else {
                        Tok::Bang
                    }
                }
                '<' => {
                    if self.eat('<') {
                        Tok::Shl
                    } else if self.eat('=') {
                        Tok::Le
                    } else {
                        Tok::Lt
                    }
                }
                '>' => {
                    if self.eat('>') {
                        Tok::Shr
                    } else if self.eat('=') {
                        Tok::Ge
                    } else {
                        Tok::Gt
                    }
                }
                '+' => Tok::Plus,
                '-' => Tok::Minus,
                '*' => Tok::Star,
                '/' => Tok::Slash,
                '%' => {
                    // '%' is the binary-literal prefix in primary position
                    // (start of expression, or right after an operator/`(`/
                    // `,`) and the modulo operator right after a value,
                    // mirroring how `*` disambiguates location-counter vs.
                    // multiply by parser position.
                    if self.last_was_value {
                        Tok::Percent
                    } else {
                        self.lex_radix_digits(2)?;
                        self.last_was_value = true;
                        continue;
                    }
                }
                '~' => Tok::Tilde,
                '(' => Tok::LParen,
                ')' => Tok::RParen,
                ',' => Tok::Comma,
                '$' => {
                    self.lex_radix_digits(16)?;
                    self.last_was_value = true;
                    continue;
                }
                other => return Err(format!("unexpected character '{}' in expression", other)),
            };
            self.last_was_value = matches!(tok, Tok::RParen);
            self.toks.push(tok);
        }

        Ok(self.toks)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.chars.peek() == Some(&c) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn lex_radix_digits(&mut self, radix: u32) -> Result<(), String> {
        let mut digits = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_digit(radix) || c == '_' {
                if c != '_' {
                    digits.push(c);
                }
                self.chars.next();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err("expected digits after radix prefix".to_string());
        }
        let value = i64::from_str_radix(&digits, radix).map_err(|e| e.to_string())?;
        self.toks.push(Tok::Num(value));
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), String> {
        let mut raw = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                raw.push(c);
                self.chars.next();
            } else {
                break;
            }
        }

        let lower = raw.to_ascii_lowercase();
        let value = if let Some(rest) = lower.strip_prefix("0x") {
            i64::from_str_radix(&rest.replace('_', ""), 16).map_err(|e| e.to_string())?
        } else if let Some(rest) = lower.strip_prefix("0b") {
            i64::from_str_radix(&rest.replace('_', ""), 2).map_err(|e| e.to_string())?
        } else if raw.len() > 1 && lower.starts_with('b') && lower[1..].chars().all(|c| c == '0' || c == '1' || c == '_') {
            i64::from_str_radix(&lower[1..].replace('_', ""), 2).map_err(|e| e.to_string())?
        } else {
            raw.replace('_', "").parse::<i64>().map_err(|e| e.to_string())?
        };

        self.toks.push(Tok::Num(value));
        Ok(())
    }

    fn lex_char_literal(&mut self, quote: char) -> Result<(), String> {
        self.chars.next();
        let c = match self.chars.next() {
            Some('\\') => {
                let escaped = self.chars.next().ok_or("unterminated character literal")?;
                decode_escape(escaped).ok_or("invalid escape sequence")?
            }
            Some(c) => c,
            None => return Err("unterminated character literal".to_string()),
        };
        match self.chars.next() {
            Some(c) if c == quote => {}
            _ => return Err("character literal must be exactly one character".to_string()),
        }
        self.toks.push(Tok::Num(c as i64));
        Ok(())
    }

    fn lex_ident(&mut self) {
        let mut raw = String::new();
        while let Some(&c) = self.chars.peek() {
            if is_ident_continue(c) {
                raw.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        self.toks.push(Tok::Ident(raw));
    }
}

/// Anything that can resolve an identifier or the location counter on
/// behalf of the evaluator. Implemented by the full pass 1/pass 2 symbol
/// table and, separately, by the restricted loop-count evaluator.
pub trait EvalContext {
    /// `None` means the symbol can't be looked up at all in this context
    /// (e.g. the restricted loop evaluator never resolves labels).
    fn lookup(&self, name: &str) -> Option<i64>;

    /// The current location counter value, if one is defined in this
    /// context (the loop evaluator has none).
    fn location_counter(&self) -> Option<i64>;
}

pub struct Evaluator<'c, C: EvalContext> {
    ctx: &'c C,
    /// When true, an unknown identifier evaluates to 0 instead of raising
    /// an error (used for `.if` branches under an inactive parent, which
    /// only need syntax-checking).
    pub syntax_check_only: bool,
}

impl<'c, C: EvalContext> Evaluator<'c, C> {
    pub fn new(ctx: &'c C) -> Self {
        Self { ctx, syntax_check_only: false }
    }

    pub fn syntax_check(ctx: &'c C) -> Self {
        Self { ctx, syntax_check_only: true }
    }

    pub fn eval(&self, expr: &str, origin: &Origin) -> Result<i64, AssembleError> {
        let toks = Lexer::new(expr).lex().map_err(|e| err!(Syntax, origin, "Invalid expression: {}", e))?;
        if toks.is_empty() {
            return Err(err!(Syntax, origin, "Expected an expression"));
        }
        let mut parser = Parser { toks: &toks, pos: 0, eval: self, origin };
        let value = parser.parse_or()?;
        if parser.pos != toks.len() {
            return Err(err!(Syntax, origin, "Unexpected trailing tokens in expression"));
        }
        Ok(value)
    }
}

struct Parser<'t, 'c, C: EvalContext> {
    toks: &'t [Tok],
    pos: usize,
    eval: &'t Evaluator<'c, C>,
    origin: &'t Origin,
}

macro_rules! binop_level {
    ($name:ident, $next:ident, { $($tok:pat => $f:expr),+ $(,)? }) => {
        fn $name(&mut self) -> Result<i64, AssembleError> {
            let mut lhs = self.$next()?;
            loop {
                let op = match self.peek() {
                    $(Some($tok) => $tok,)+
                    _ => break,
                };
                self.pos += 1;
                let rhs = self.$next()?;
                lhs = Self::apply(&op, lhs, rhs)?;
            }
            Ok(lhs)
        }
    };
}

impl<'t, 'c, C: EvalContext> Parser<'t, 'c, C> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn apply(op: &Tok, lhs: i64, rhs: i64) -> Result<i64, AssembleError> {
        Ok(match op {
            Tok::OrOr => ((lhs != 0) || (rhs != 0)) as i64,
            Tok::AndAnd => ((lhs != 0) && (rhs != 0)) as i64,
            Tok::Pipe => lhs | rhs,
            Tok::Caret => lhs ^ rhs,
            Tok::Amp => lhs & rhs,
            Tok::EqEq => (lhs == rhs) as i64,
            Tok::Ne => (lhs != rhs) as i64,
            Tok::Lt => (lhs < rhs) as i64,
            Tok::Gt => (lhs > rhs) as i64,
            Tok::Le => (lhs <= rhs) as i64,
            Tok::Ge => (lhs >= rhs) as i64,
            Tok::Shl => lhs.wrapping_shl((rhs & 0x1f) as u32),
            Tok::Shr => lhs.wrapping_shr((rhs & 0x1f) as u32),
            Tok::Plus => lhs.wrapping_add(rhs),
            Tok::Minus => lhs.wrapping_sub(rhs),
            _ => unreachable!(),
        })
    }

    fn parse_or(&mut self) -> Result<i64, AssembleError> {
        self.parse_oror()
    }

    binop_level!(parse_oror, parse_andand, { Tok::OrOr => Tok::OrOr });
    binop_level!(parse_andand, parse_bitor, { Tok::AndAnd => Tok::AndAnd });
    binop_level!(parse_bitor, parse_bitxor, { Tok::Pipe => Tok::Pipe });
    binop_level!(parse_bitxor, parse_bitand, { Tok::Caret => Tok::Caret });
    binop_level!(parse_bitand, parse_eq, { Tok::Amp => Tok::Amp });
    binop_level!(parse_eq, parse_rel, { Tok::EqEq => Tok::EqEq, Tok::Ne => Tok::Ne });
    binop_level!(parse_rel, parse_shift, { Tok::Lt => Tok::Lt, Tok::Gt => Tok::Gt, Tok::Le => Tok::Le, Tok::Ge => Tok::Ge });
    binop_level!(parse_shift, parse_additive, { Tok::Shl => Tok::Shl, Tok::Shr => Tok::Shr });
    binop_level!(parse_additive, parse_term, { Tok::Plus => Tok::Plus, Tok::Minus => Tok::Minus });

    fn parse_term(&mut self) -> Result<i64, AssembleError> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Tok::Star) => {
                    self.pos += 1;
                    let rhs = self.parse_unary()?;
                    lhs = lhs.wrapping_mul(rhs);
                }
                Some(Tok::Slash) => {
                    self.pos += 1;
                    let rhs = self.parse_unary()?;
                    if rhs == 0 {
                        return Err(err!(Range, self.origin, "Division by zero"));
                    }
                    lhs /= rhs;
                }
                Some(Tok::Percent) => {
                    self.pos += 1;
                    let rhs = self.parse_unary()?;
                    if rhs == 0 {
                        return Err(err!(Range, self.origin, "Modulo by zero"));
                    }
                    lhs %= rhs;
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<i64, AssembleError> {
        match self.peek() {
            Some(Tok::Plus) => {
                self.pos += 1;
                self.parse_unary()
            }
            Some(Tok::Minus) => {
                self.pos += 1;
                Ok(-self.parse_unary()?)
            }
            Some(Tok::Bang) => {
                self.pos += 1;
                Ok((self.parse_unary()? == 0) as i64)
            }
            Some(Tok::Tilde) => {
                self.pos += 1;
                Ok(!self.parse_unary()?)
            }
            Some(Tok::Lt) => {
                self.pos += 1;
                Ok(self.parse_unary()? & 0xFF)
            }
            Some(Tok::Gt) => {
                self.pos += 1;
                Ok((self.parse_unary()? >> 8) & 0xFF)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<i64, AssembleError> {
        match self.toks.get(self.pos).cloned() {
            Some(Tok::Num(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(Tok::Star) => {
                self.pos += 1;
                self.eval.ctx.location_counter().ok_or_else(|| err!(Semantic, self.origin, "The location counter '*' is not available here"))
            }
            Some(Tok::Ident(name)) => {
                self.pos += 1;
                self.resolve_ident(&name)
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                let value = self.parse_or()?;
                match self.peek() {
                    Some(Tok::RParen) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err(err!(Syntax, self.origin, "Expected closing ')'")),
                }
            }
            _ => Err(err!(Syntax, self.origin, "Expected a value in expression")),
        }
    }

    fn resolve_ident(&self, name: &str) -> Result<i64, AssembleError> {
        match name.to_ascii_lowercase().as_str() {
            "true" => return Ok(1),
            "false" => return Ok(0),
            _ => {}
        }

        if let Some(value) = self.eval.ctx.lookup(name) {
            return Ok(value);
        }

        if self.eval.syntax_check_only {
            return Ok(0);
        }

        Err(err!(Semantic, self.origin, "Undefined symbol '{}'", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx {
        consts: std::collections::HashMap<&'static str, i64>,
        loc: Option<i64>,
    }

    impl EvalContext for Ctx {
        fn lookup(&self, name: &str) -> Option<i64> {
            self.consts.get(name).copied()
        }
        fn location_counter(&self) -> Option<i64> {
            self.loc
        }
    }

    fn origin() -> Origin {
        Origin::top_level(asm_support::origin::UnitPath::new("<test>".into()), 1, std::rc::Rc::from(""))
    }

    #[test]
    fn precedence_and_arithmetic() {
        let ctx = Ctx { consts: Default::default(), loc: None };
        let ev = Evaluator::new(&ctx);
        assert_eq!(ev.eval("1 + 2 * 3", &origin()).unwrap(), 7);
        assert_eq!(ev.eval("(1 + 2) * 3", &origin()).unwrap(), 9);
        assert_eq!(ev.eval("10 / 3", &origin()).unwrap(), 3);
        assert_eq!(ev.eval("-5 + 2", &origin()).unwrap(), -3);
    }

    #[test]
    fn byte_extract_operators() {
        let ctx = Ctx { consts: Default::default(), loc: None };
        let ev = Evaluator::new(&ctx);
        assert_eq!(ev.eval("<0x1234", &origin()).unwrap(), 0x34);
        assert_eq!(ev.eval(">0x1234", &origin()).unwrap(), 0x12);
    }

    #[test]
    fn location_counter() {
        let ctx = Ctx { consts: Default::default(), loc: Some(0x100) };
        let ev = Evaluator::new(&ctx);
        assert_eq!(ev.eval("*", &origin()).unwrap(), 0x100);
        assert_eq!(ev.eval("* + 2", &origin()).unwrap(), 0x102);
    }

    #[test]
    fn percent_prefix_is_binary_literal_but_infix_percent_is_modulo() {
        let ctx = Ctx { consts: Default::default(), loc: None };
        let ev = Evaluator::new(&ctx);
        assert_eq!(ev.eval("%1010", &origin()).unwrap(), 10);
        assert_eq!(ev.eval("%10_10", &origin()).unwrap(), 10);
        assert_eq!(ev.eval("7 % 2", &origin()).unwrap(), 1);
        assert_eq!(ev.eval("(%101) % 2", &origin()).unwrap(), 1);
    }

    #[test]
    fn unknown_symbol_errors_unless_syntax_check() {
        let ctx = Ctx { consts: Default::default(), loc: None };
        assert!(Evaluator::new(&ctx).eval("foo", &origin()).is_err());
        assert_eq!(Evaluator::syntax_check(&ctx).eval("foo", &origin()).unwrap(), 0);
    }
}
