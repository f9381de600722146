//! Stage 2: macro collection and call-site expansion.
//!
//! Grounded on `parser.rs`'s line-oriented expansion technique (scan a
//! line buffer for call sites, splice the substituted body back in,
//! re-scan the result for nested calls) re-targeted at this pipeline's
//! `.macro NAME(params) ... .endmacro` surface syntax instead of the
//! teacher's `%%-`/`!NAME(...)` macro forms.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use asm_support::origin::Origin;

use crate::error::{err, AssembleError};
use crate::line::Line;
use crate::line_syntax::{self, LeadingLabel};

pub const MAX_MACRO_DEPTH: usize = 32;

#[derive(Debug)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<(String, Option<String>)>,
    pub body: Vec<Line>,
    /// Non-local (non-`@`) label names appearing in the body; rewritten
    /// to `scopeName.label` at each call site.
    pub normal_labels: HashSet<String>,
    invocation_count: Cell<usize>,
}

fn is_directive(trimmed: &str, name: &str) -> bool {
    let lower = trimmed.to_ascii_lowercase();
    lower == name || lower.starts_with(&format!("{} ", name)) || lower.starts_with(&format!("{}(", name))
}

fn parse_macro_header(trimmed: &str, origin: &Origin) -> Result<(String, Vec<(String, Option<String>)>), AssembleError> {
    let after = trimmed[".macro".len()..].trim_start();
    let paren_start = after.find('(').ok_or_else(|| err!(Syntax, origin, "Expected '(' in .macro header"))?;
    let name = after[..paren_start].trim().to_string();
    if !line_syntax::is_identifier(&name) {
        return Err(err!(Syntax, origin, "Invalid macro name '{}'", name));
    }
    let paren_end = after.rfind(')').ok_or_else(|| err!(Syntax, origin, "Expected ')' to close .macro header"))?;
    if paren_end < paren_start {
        return Err(err!(Syntax, origin, "Malformed .macro header"));
    }
    let params_src = &after[paren_start + 1..paren_end];
    let mut params = Vec::new();
    for raw in line_syntax::split_top_level_commas(params_src) {
        if raw.is_empty() {
            continue;
        }
        match raw.split_once('=') {
            Some((pname, default)) => params.push((pname.trim().to_string(), Some(default.trim().to_string()))),
            None => params.push((raw.trim().to_string(), None)),
        }
        let added = params.last().unwrap();
        if !line_syntax::is_identifier(&added.0) {
            return Err(err!(Syntax, origin, "Invalid macro parameter name '{}'", added.0));
        }
    }
    Ok((name, params))
}

fn body_label_names(body: &[Line]) -> HashSet<String> {
    let mut labels = HashSet::new();
    for line in body {
        if let (Some(LeadingLabel::Global(name)), _) = line_syntax::split_leading_label(&line.text) {
            labels.insert(name);
        }
    }
    labels
}

/// Extracts every `.macro ... .endmacro` block from `lines`, returning the
/// remaining lines (with definitions removed) and the collected table.
pub fn collect_macros(lines: Vec<Line>) -> (Vec<Line>, HashMap<String, MacroDef>, Vec<AssembleError>) {
    let mut pruned = Vec::new();
    let mut macros = HashMap::new();
    let mut errors = Vec::new();

    let mut iter = lines.into_iter().peekable();
    while let Some(line) = iter.next() {
        let trimmed = line.trimmed();

        if is_directive(trimmed, ".macro") {
            let (name, params) = match parse_macro_header(trimmed, &line.origin) {
                Ok(v) => v,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            let mut body = Vec::new();
            let mut depth = 1usize;
            let mut closed = false;
            for body_line in iter.by_ref() {
                let body_trimmed = body_line.trimmed();
                if is_directive(body_trimmed, ".macro") {
                    errors.push(err!(Semantic, &body_line.origin, "Nested .macro definitions are not allowed"));
                    depth += 1;
                    continue;
                }
                let lower = body_trimmed.to_ascii_lowercase();
                if lower == ".endmacro" || lower == ".endm" {
                    depth -= 1;
                    if depth == 0 {
                        closed = true;
                        break;
                    }
                    continue;
                }
                body.push(body_line);
            }

            if !closed {
                errors.push(err!(Structure, &line.origin, "Unterminated .macro '{}': missing .endmacro", name));
                continue;
            }

            if macros.contains_key(&name) {
                errors.push(err!(Semantic, &line.origin, "Duplicate macro definition '{}'", name));
                continue;
            }

            let normal_labels = body_label_names(&body);
            macros.insert(
                name.clone(),
                MacroDef { name, params, body, normal_labels, invocation_count: Cell::new(0) },
            );
            continue;
        }

        pruned.push(line);
    }

    (pruned, macros, errors)
}

/// Parses `[label:] NAME(args)` (or bare `NAME` when the macro takes no
/// parameters) at the start of `text`. Returns `None` when `text` isn't
/// shaped like a call at all, independent of whether `NAME` is a known
/// macro.
fn parse_call(text: &str) -> Option<(String, Option<String>)> {
    let trimmed = text.trim();
    let (name, rest) = line_syntax::split_first_word_by(trimmed, |c| c == '(');
    if name.is_empty() || !line_syntax::is_identifier(name) {
        return None;
    }
    if rest.is_empty() {
        return Some((name.to_string(), None));
    }
    let rest = rest.trim_start();
    if !rest.starts_with('(') || !rest.ends_with(')') {
        return None;
    }
    Some((name.to_string(), Some(rest[1..rest.len() - 1].to_string())))
}

fn value_needs_paren(value: &str) -> bool {
    value.chars().any(|c| c.is_whitespace() || "+-*/%&|^!~<>=".contains(c))
}

/// Substitutes whole-word occurrences of bound parameter names in `text`
/// with their values, respecting string-literal contents and wrapping the
/// substituted value in parentheses when it contains an operator or
/// whitespace (and specially when immediately preceded by a byte-extract
/// `<`/`>`).
fn substitute_params(text: &str, bindings: &HashMap<String, String>) -> String {
    let mut out = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    while i < chars.len() {
        let c = chars[i];

        if let Some(quote) = in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            in_string = Some(c);
            out.push(c);
            i += 1;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if let Some(value) = bindings.get(&word) {
                if value_needs_paren(value) {
                    out.push_str(&format!("({})", value));
                } else {
                    out.push_str(value);
                }
            } else {
                out.push_str(&word);
            }
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

/// Rewrites every whole-word occurrence of a known normal label - both its
/// `label:` definition and any bare reference to it elsewhere on the line,
/// e.g. a jump target - to `scopeName.label`, respecting string-literal
/// contents and leaving local (`@`-prefixed) identifiers alone. Walks the
/// line the same character-by-character way `substitute_params` walks
/// parameter tokens.
fn rewrite_normal_labels(text: &str, normal_labels: &HashSet<String>, scope_name: &str) -> String {
    if normal_labels.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    while i < chars.len() {
        let c = chars[i];

        if let Some(quote) = in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            in_string = Some(c);
            out.push(c);
            i += 1;
            continue;
        }

        if (c.is_ascii_alphabetic() || c == '_') && (i == 0 || chars[i - 1] != '@') {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if normal_labels.contains(&word) {
                out.push_str(&format!("{}.{}", scope_name, word));
            } else {
                out.push_str(&word);
            }
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

struct Expander<'m> {
    macros: &'m HashMap<String, MacroDef>,
    errors: Vec<AssembleError>,
}

impl<'m> Expander<'m> {
    fn expand_stream(&mut self, lines: Vec<Line>, parent_scope: &str, depth: usize) -> Vec<Line> {
        let mut out = Vec::new();
        for line in lines {
            out.extend(self.expand_line(line, parent_scope, depth));
        }
        out
    }

    fn expand_line(&mut self, line: Line, parent_scope: &str, depth: usize) -> Vec<Line> {
        if line.is_blank() {
            return vec![line];
        }

        let (label, rest) = line_syntax::split_leading_label(&line.text);
        let Some((name, args_src)) = parse_call(rest) else {
            return vec![line];
        };
        let Some(def) = self.macros.get(&name) else {
            return vec![line];
        };

        if depth >= MAX_MACRO_DEPTH {
            self.errors.push(err!(Structure, &line.origin, "Macro expansion nesting exceeds depth {}", MAX_MACRO_DEPTH));
            return Vec::new();
        }

        let mut produced = Vec::new();
        if let Some(label) = label {
            let label_text = match label {
                LeadingLabel::Global(n) => format!("{}:", n),
                LeadingLabel::Local(n) => format!("@{}:", n),
            };
            produced.push(Line::new(label_text, line.origin.clone()));
        }

        let args = args_src.map(|s| line_syntax::split_top_level_commas(&s)).unwrap_or_default();
        let mut bindings: HashMap<String, String> = HashMap::new();
        for (i, (pname, default)) in def.params.iter().enumerate() {
            let value = match args.get(i) {
                Some(v) if !v.is_empty() => v.clone(),
                _ => match default {
                    Some(expr) => substitute_params(expr, &bindings),
                    None => {
                        self.errors.push(err!(Semantic, &line.origin, "Missing required argument '{}' for macro '{}'", pname, name));
                        continue;
                    }
                },
            };
            bindings.insert(pname.clone(), value);
        }
        if args.len() > def.params.len() {
            self.errors.push(err!(Semantic, &line.origin, "Too many arguments for macro '{}'", name));
        }

        let ordinal = def.invocation_count.get() + 1;
        def.invocation_count.set(ordinal);
        let scope_name = format!("{}_{}", name, ordinal);
        let scope_chain: Rc<str> = Rc::from(if parent_scope.is_empty() {
            scope_name.clone()
        } else {
            format!("{}::{}", parent_scope, scope_name)
        });

        let mut body_lines = Vec::with_capacity(def.body.len());
        for body_line in &def.body {
            let substituted = substitute_params(&body_line.text, &bindings);
            let rewritten = rewrite_normal_labels(&substituted, &def.normal_labels, &scope_name);
            let origin = body_line.origin.expand_in_macro(Rc::from(name.as_str()), ordinal, Rc::clone(&scope_chain), line.origin.clone());
            body_lines.push(Line::new(rewritten, origin));
        }

        let expanded = self.expand_stream(body_lines, &scope_chain, depth + 1);
        produced.extend(expanded);
        produced
    }
}

/// Expands every call site against `macros`, recursively, up to
/// [`MAX_MACRO_DEPTH`] nested calls.
pub fn expand_macros(lines: Vec<Line>, macros: &HashMap<String, MacroDef>) -> (Vec<Line>, Vec<AssembleError>) {
    let mut expander = Expander { macros, errors: Vec::new() };
    let out = expander.expand_stream(lines, "", 0);
    (out, expander.errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asm_support::origin::UnitPath;

    fn line(text: &str) -> Line {
        Line::new(text.to_string(), Origin::top_level(UnitPath::new("<test>".into()), 1, Rc::from(text)))
    }

    #[test]
    fn collects_a_simple_macro() {
        let lines = vec![line(".macro INC2()"), line("INR A"), line("INR A"), line(".endmacro"), line("INC2()")];
        let (pruned, macros, errors) = collect_macros(lines);
        assert!(errors.is_empty());
        assert_eq!(pruned.len(), 1);
        assert!(macros.contains_key("INC2"));
    }

    #[test]
    fn expands_call_site_with_correct_body_count() {
        let lines = vec![line(".macro INC2()"), line("INR A"), line("INR A"), line(".endmacro"), line("INC2()")];
        let (pruned, macros, errors) = collect_macros(lines);
        assert!(errors.is_empty());
        let (expanded, errors) = expand_macros(pruned, &macros);
        assert!(errors.is_empty());
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].text.trim(), "INR A");
    }

    #[test]
    fn missing_required_argument_is_an_error() {
        let lines = vec![line(".macro FOO(x)"), line("MVI A, x"), line(".endmacro"), line("FOO()")];
        let (pruned, macros, errors) = collect_macros(lines);
        assert!(errors.is_empty());
        let (_, errors) = expand_macros(pruned, &macros);
        assert!(!errors.is_empty());
    }

    #[test]
    fn parameter_substitution_wraps_operator_values_in_parens() {
        let mut bindings = HashMap::new();
        bindings.insert("x".to_string(), "1+2".to_string());
        assert_eq!(substitute_params("MVI A, x", &bindings), "MVI A, (1+2)");
    }

    #[test]
    fn normal_label_rewrite_covers_both_definition_and_reference() {
        let lines = vec![line(".macro TWICE()"), line("top: DCR A"), line(" JNZ top"), line(".endmacro"), line("TWICE()")];
        let (pruned, macros, errors) = collect_macros(lines);
        assert!(errors.is_empty());
        let (expanded, errors) = expand_macros(pruned, &macros);
        assert!(errors.is_empty());
        assert_eq!(expanded[0].text, "TWICE_1.top: DCR A");
        assert_eq!(expanded[1].text, " JNZ TWICE_1.top");
    }
}
