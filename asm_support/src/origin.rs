//! Provenance tracking for assembled source lines.
//!
//! Every line that reaches pass 1 or pass 2 carries an [`Origin`]: the file
//! and original line number it was written on, the raw text as the user
//! wrote it, and - if the line was produced by expanding a macro call - a
//! chain of [`MacroInstance`] records back to the call site. Loop expansion
//! does not add a new link: a repeated body line keeps the origin of its
//! single definition, since the spec does not require per-iteration
//! provenance.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A resolved (canonicalized where possible) source file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitPath {
    path: Rc<PathBuf>,
}

impl UnitPath {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Rc::new(path) }
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// The file name without its directory components, as used in debug
    /// output and scope-key computation.
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

impl fmt::Display for UnitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// One call-site link in a macro expansion chain.
#[derive(Debug, Clone)]
pub struct MacroInstance {
    pub name: Rc<str>,
    pub ordinal: usize,
    /// The full dotted scope chain up to and including this call, e.g.
    /// `"OUTER_1::INNER_2"`.
    pub scope: Rc<str>,
    /// The origin of the line that performed the call.
    pub caller: Origin,
}

/// Where an expanded line ultimately came from.
#[derive(Debug, Clone)]
pub struct Origin {
    pub file: UnitPath,
    /// 1-based original line number within `file`.
    pub line: usize,
    /// The raw source text of that original line, used in diagnostics.
    pub text: Rc<str>,
    pub macro_instance: Option<Rc<MacroInstance>>,
}

impl Origin {
    pub fn top_level(file: UnitPath, line: usize, text: Rc<str>) -> Self {
        Self { file, line, text, macro_instance: None }
    }

    /// The macro scope chain this origin was expanded under, if any.
    pub fn macro_scope(&self) -> Option<&str> {
        self.macro_instance.as_ref().map(|m| m.scope.as_ref())
    }

    /// Wraps this origin as having been produced inside a macro expansion.
    pub fn expand_in_macro(&self, name: Rc<str>, ordinal: usize, scope: Rc<str>, caller: Origin) -> Self {
        Self {
            file: self.file.clone(),
            line: self.line,
            text: Rc::clone(&self.text),
            macro_instance: Some(Rc::new(MacroInstance { name, ordinal, scope, caller })),
        }
    }

    /// Walks the caller chain outward, most recent call first, for
    /// building "called from" diagnostic traces.
    pub fn call_stack(&self) -> Vec<&MacroInstance> {
        let mut stack = Vec::new();
        let mut cur = self.macro_instance.as_deref();
        while let Some(inst) = cur {
            stack.push(inst);
            cur = inst.caller.macro_instance.as_deref();
        }
        stack
    }
}
