//! Stage 3: `.loop <expr> ... .endloop` repetition.
//!
//! Same line-buffer-rewrite technique as `macros.rs` (scan, find a
//! balanced block, recurse into it, splice the result back in), scoped
//! down to the restricted constant-only evaluator loop expansion requires.

use std::collections::HashMap;

use crate::directive::{classify, Stmt};
use crate::error::{err, AssembleError};
use crate::expr::Evaluator;
use crate::line::Line;
use crate::symbol_table::RestrictedContext;

const MAX_LOOP_COUNT: i64 = 100_000;

/// Records a top-level `NAME = expr` / `NAME EQU expr` constant into
/// `consts`, the only kind of line the loop evaluator's restricted symbol
/// table is populated from (`.var` variables are deliberately excluded,
/// used during loop-count evaluation).
fn record_assignment_if_present(line: &Line, consts: &mut HashMap<String, i64>) {
    let Stmt::Assignment { name, expr } = classify(line.trimmed()).kind else { return };
    let ctx = RestrictedContext { consts: &*consts };
    if let Ok(value) = Evaluator::new(&ctx).eval(expr, &line.origin) {
        consts.insert(name, value);
    }
}

fn is_loop_start(trimmed: &str) -> bool {
    let lower = trimmed.to_ascii_lowercase();
    lower == ".loop" || lower.starts_with(".loop ") || lower.starts_with(".loop\t")
}

fn is_loop_end(trimmed: &str) -> bool {
    trimmed.eq_ignore_ascii_case(".endloop")
}

fn expand(lines: Vec<Line>, consts: &mut HashMap<String, i64>, errors: &mut Vec<AssembleError>) -> Vec<Line> {
    let mut out = Vec::new();
    let mut iter = lines.into_iter().peekable();

    while let Some(line) = iter.next() {
        let trimmed = line.trimmed();

        if is_loop_start(trimmed) {
            let expr_src = trimmed[".loop".len()..].trim();

            let mut body = Vec::new();
            let mut depth = 1usize;
            let mut closed = false;
            while let Some(next) = iter.next() {
                let next_trimmed = next.trimmed();
                if is_loop_start(next_trimmed) {
                    depth += 1;
                    body.push(next);
                    continue;
                }
                if is_loop_end(next_trimmed) {
                    depth -= 1;
                    if depth == 0 {
                        closed = true;
                        break;
                    }
                    body.push(next);
                    continue;
                }
                body.push(next);
            }

            if !closed {
                errors.push(err!(Structure, &line.origin, "Unterminated .loop: missing .endloop"));
                continue;
            }

            let ctx = RestrictedContext { consts: &*consts };
            let count = match Evaluator::syntax_check(&ctx).eval(expr_src, &line.origin) {
                Ok(v) => v,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            if count < 0 || count > MAX_LOOP_COUNT {
                errors.push(err!(Range, &line.origin, "Loop count {} out of range [0, {}]", count, MAX_LOOP_COUNT));
                continue;
            }

            let expanded_body = expand(body, consts, errors);
            for _ in 0..count {
                out.extend(expanded_body.iter().cloned());
            }
            continue;
        }

        if is_loop_end(trimmed) {
            errors.push(err!(Structure, &line.origin, "Unmatched .endloop"));
            continue;
        }

        record_assignment_if_present(&line, consts);
        out.push(line);
    }

    out
}

/// Expands every `.loop`/`.endloop` block in `lines`.
pub fn expand_loops(lines: Vec<Line>) -> (Vec<Line>, Vec<AssembleError>) {
    let mut consts = HashMap::new();
    let mut errors = Vec::new();
    let out = expand(lines, &mut consts, &mut errors);
    (out, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asm_support::origin::{Origin, UnitPath};
    use std::rc::Rc;

    fn line(text: &str) -> Line {
        Line::new(text.to_string(), Origin::top_level(UnitPath::new("<test>".into()), 1, Rc::from(text)))
    }

    #[test]
    fn repeats_body_n_times() {
        let lines = vec![line("N = 3"), line(".loop N"), line("NOP"), line(".endloop")];
        let (out, errors) = expand_loops(lines);
        assert!(errors.is_empty());
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|l| l.trimmed() == "NOP"));
    }

    #[test]
    fn forward_reference_is_tolerated_as_zero() {
        let lines = vec![line(".loop UNDEFINED"), line("NOP"), line(".endloop")];
        let (out, errors) = expand_loops(lines);
        assert!(errors.is_empty());
        assert!(out.is_empty());
    }

    #[test]
    fn count_above_limit_is_a_range_error() {
        let lines = vec![line(".loop 100001"), line("NOP"), line(".endloop")];
        let (_, errors) = expand_loops(lines);
        assert!(!errors.is_empty());
    }

    #[test]
    fn nested_loops_multiply() {
        let lines = vec![line(".loop 2"), line(".loop 3"), line("NOP"), line(".endloop"), line(".endloop")];
        let (out, errors) = expand_loops(lines);
        assert!(errors.is_empty());
        assert_eq!(out.len(), 6);
    }
}
