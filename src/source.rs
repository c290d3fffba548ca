//! Source Reader (§4.1): resolves logical file names to file contents
//! along the configured include-path search list, memoizing opens so a
//! diamond `#import` graph reads each file's bytes once.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::breadcrumb::NO_POSITION;
use crate::config::CompilerConfig;
use crate::error::{lexer_error, CompileError};

pub struct SourceReader {
    search_path: Vec<PathBuf>,
    main_path: PathBuf,
    cache: RefCell<HashMap<String, String>>,
}

impl SourceReader {
    pub fn new(main_path: impl Into<PathBuf>, config: &CompilerConfig) -> Self {
        let main_path = main_path.into();
        let mut search_path = config.include_paths.clone();
        if let Some(dir) = main_path.parent() {
            search_path.insert(0, dir.to_path_buf());
        }
        SourceReader {
            search_path,
            main_path,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn main_name(&self) -> String {
        self.main_path.to_string_lossy().into_owned()
    }

    /// Opens `name`, searching the configured include directories in
    /// order. Memoized: a second `open` for the same name returns the
    /// cached contents without touching the filesystem again.
    pub fn open(&self, name: &str) -> Result<String, CompileError> {
        if let Some(cached) = self.cache.borrow().get(name) {
            return Ok(cached.clone());
        }
        let resolved = self.resolve(name).ok_or_else(|| {
            lexer_error(
                NO_POSITION,
                format!("cannot find \"{name}\" in the include paths"),
            )
        })?;
        let contents = fs::read_to_string(&resolved).map_err(|e| {
            lexer_error(NO_POSITION, format!("cannot read \"{name}\": {e}"))
        })?;
        self.cache.borrow_mut().insert(name.to_string(), contents.clone());
        Ok(contents)
    }

    /// Opens the main input file directly, bypassing the search path (it
    /// is addressed by its own path, not a logical `#import` name).
    pub fn open_main(&self) -> Result<String, CompileError> {
        let contents = fs::read_to_string(&self.main_path).map_err(|e| {
            lexer_error(
                NO_POSITION,
                format!("cannot read \"{}\": {e}", self.main_path.display()),
            )
        })?;
        self.cache
            .borrow_mut()
            .insert(self.main_name(), contents.clone());
        Ok(contents)
    }

    pub fn close(&self, name: &str) {
        self.cache.borrow_mut().remove(name);
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        if Path::new(name).is_absolute() {
            let p = PathBuf::from(name);
            if p.is_file() {
                return Some(p);
            }
            return None;
        }
        for dir in &self.search_path {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn opens_file_on_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        fs::write(&main, "var x :: Int = 1\n").unwrap();
        let included = dir.path().join("lib.pr");
        fs::write(&included, "var y :: Int = 2\n").unwrap();

        let config = CompilerConfig::new();
        let reader = SourceReader::new(&main, &config);
        let contents = reader.open("lib.pr").unwrap();
        assert!(contents.contains("var y"));
    }

    #[test]
    fn missing_file_fails_at_no_position() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        fs::write(&main, "").unwrap();
        let config = CompilerConfig::new();
        let reader = SourceReader::new(&main, &config);
        let err = reader.open("missing.pr").unwrap_err();
        assert_eq!(err.position(), NO_POSITION);
    }

    #[test]
    fn open_memoizes_repeated_reads() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        fs::write(&main, "").unwrap();
        let included = dir.path().join("lib.pr");
        let mut f = fs::File::create(&included).unwrap();
        writeln!(f, "var y :: Int = 2").unwrap();

        let config = CompilerConfig::new();
        let reader = SourceReader::new(&main, &config);
        let first = reader.open("lib.pr").unwrap();
        fs::write(&included, "var y :: Int = 999").unwrap();
        let second = reader.open("lib.pr").unwrap();
        assert_eq!(first, second);
    }
}
