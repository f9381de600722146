//! Scope-key computation for local-label resolution.
//!
//! `scopes[i] = resolve(origin.file) + "::" + directiveCounter [+ "::" +
//! macroScope]`. Computed once, ahead of both passes, so pass 1 and pass 2
//! can never disagree about which region a local label belongs to.

use crate::line::Line;
use crate::line_syntax;

fn is_org_directive(text: &str) -> bool {
    let (_, rest) = line_syntax::split_leading_label(text);
    let (word, _) = line_syntax::split_first_word(rest);
    word.eq_ignore_ascii_case(".org") || word.eq_ignore_ascii_case("org")
}

/// Computes the scope key for every line in `lines`, in lockstep.
pub fn compute_scope_keys(lines: &[Line]) -> Vec<String> {
    let mut counter: u64 = 0;
    let mut prev_file = None;
    let mut keys = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        if i > 0 && prev_file.as_ref() != Some(&line.origin.file) {
            counter += 1;
        }
        if is_org_directive(line.trimmed()) {
            counter += 1;
        }

        let base = format!("{}::{}", line.origin.file.as_path().display(), counter);
        let key = match line.origin.macro_scope() {
            Some(scope) => format!("{}::{}", base, scope),
            None => base,
        };
        keys.push(key);
        prev_file = Some(line.origin.file.clone());
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use asm_support::origin::{Origin, UnitPath};
    use std::rc::Rc;

    fn line(text: &str) -> Line {
        Line::new(text.to_string(), Origin::top_level(UnitPath::new("a.asm".into()), 1, Rc::from(text)))
    }

    #[test]
    fn org_opens_a_new_scope_region() {
        let lines = vec![line("NOP"), line(".org 0x100"), line("NOP")];
        let keys = compute_scope_keys(&lines);
        assert_ne!(keys[0], keys[1]);
        assert_eq!(keys[1], keys[2]);
    }
}
