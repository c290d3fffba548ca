//! `CompilerConfig`: everything the Design Notes' "Global mutable state"
//! flag calls out is threaded explicitly here instead of read from process
//! environment ad hoc. `from_env_and_args` is the one place the two
//! required environment variables (§6) are read.

use std::path::PathBuf;

pub const PRELUDE_DIR_ENV: &str = "PERYAN_PRELUDE_DIR";
pub const TMP_DIR_ENV: &str = "PERYAN_TMP_DIR";

/// The legacy dialect's compatibility toggle (GLOSSARY "HSP-compat mode"):
/// widened numeric/`Int->String` promotion, implicit globals, label
/// statements, and the `Array.anythingElse(x)` -> `Subscr` rewrite are one
/// coherent feature behind this single flag, per Open Question 2.
#[derive(Clone, Debug)]
pub struct CompilerConfig {
    pub include_paths: Vec<PathBuf>,
    pub prelude_dir: Option<PathBuf>,
    pub tmp_dir: Option<PathBuf>,
    pub hsp_compat: bool,
    pub strict: bool,
    pub verbose: bool,
    pub dump_ast: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig {
            include_paths: Vec::new(),
            prelude_dir: None,
            tmp_dir: None,
            hsp_compat: false,
            strict: false,
            verbose: false,
            dump_ast: false,
        }
    }

    pub fn from_env_and_args(
        include_paths: Vec<PathBuf>,
        dump_ast: bool,
        verbose: bool,
        strict: bool,
    ) -> Self {
        CompilerConfig {
            include_paths,
            prelude_dir: std::env::var_os(PRELUDE_DIR_ENV).map(PathBuf::from),
            tmp_dir: std::env::var_os(TMP_DIR_ENV).map(PathBuf::from),
            hsp_compat: false,
            strict,
            verbose,
            dump_ast,
        }
    }

    pub fn with_hsp_compat(mut self, on: bool) -> Self {
        self.hsp_compat = on;
        self
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_disables_hsp_compat() {
        let cfg = CompilerConfig::new();
        assert!(!cfg.hsp_compat);
        assert!(cfg.include_paths.is_empty());
    }

    #[test]
    fn with_hsp_compat_toggles_flag() {
        let cfg = CompilerConfig::new().with_hsp_compat(true);
        assert!(cfg.hsp_compat);
    }
}
