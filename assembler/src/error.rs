//! Diagnostics.
//!
//! Every stage accumulates [`AssembleError`]s into a `Vec` instead of
//! failing fast: each stage runs to completion and reports everything it
//! can before later stages are skipped.

use std::fmt;

use asm_support::origin::Origin;
use colored::Colorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Syntax,
    Semantic,
    Range,
    Structure,
    UserRaised,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::Io => "io error",
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Semantic => "error",
            ErrorKind::Range => "range error",
            ErrorKind::Structure => "error",
            ErrorKind::UserRaised => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssembleError {
    pub kind: ErrorKind,
    pub origin: Option<Origin>,
    pub message: String,
}

impl AssembleError {
    pub fn new(kind: ErrorKind, origin: Option<Origin>, message: impl Into<String>) -> Self {
        Self { kind, origin, message: message.into() }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, None, message)
    }

    pub fn at(kind: ErrorKind, origin: &Origin, message: impl Into<String>) -> Self {
        Self::new(kind, Some(origin.clone()), message)
    }

    /// Renders this error in the caller-facing shape:
    /// `<absPath>:<origLine>: <message>` followed by a source excerpt and a
    /// `file://` link, with a macro call-stack trailer when the failure
    /// happened inside an expansion.
    pub fn format_user_visible(&self) -> String {
        let Some(origin) = &self.origin else {
            return format!("{}: {}", self.kind.label(), self.message);
        };

        let abs_path = origin.file.as_path().display();
        let mut out = format!(
            "{}:{}: {}\n> {}\nfile://{}:{}",
            abs_path, origin.line, self.message, origin.text, abs_path, origin.line,
        );

        for call in origin.call_stack() {
            out.push_str(&format!(
                "\n  in expansion of macro `{}` (call #{})",
                call.name, call.ordinal,
            ));
        }

        out
    }
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_user_visible())
    }
}

/// Renders a full batch of errors, one red block per error.
pub fn render_errors(errors: &[AssembleError]) -> String {
    errors.iter().map(|e| e.format_user_visible().red().to_string()).collect::<Vec<_>>().join("\n\n")
}

pub type AssembleErrors = Vec<AssembleError>;

macro_rules! err {
    ($kind:ident, $origin:expr, $($arg:tt)*) => {
        $crate::error::AssembleError::at($crate::error::ErrorKind::$kind, $origin, format!($($arg)*))
    };
}
pub(crate) use err;
