//! Ambient configuration: the one knob this compiler reads from the
//! environment, the include-library search path.

use std::env;
use std::path::PathBuf;

use lazy_static::lazy_static;

pub const INCLUDE_PATH_ENV_VAR: &str = "ASM8080_INCLUDE_PATH";

lazy_static! {
    /// Colon-separated list of extra directories searched for `.include`
    /// targets that aren't found relative to the including file. Empty
    /// when the environment variable is unset.
    pub static ref INCLUDE_SEARCH_PATH: Vec<PathBuf> = {
        match env::var(INCLUDE_PATH_ENV_VAR) {
            Ok(value) => env::split_paths(&value).collect(),
            Err(_) => Vec::new(),
        }
    };
}
