//! Flattener options

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Options for a single flatten run. Every switch is an explicit field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenOptions {
    /// Extra quoted-include search directories, searched after the build
    /// database directories. Relative entries resolve against the root
    /// file's directory.
    pub extra_include_dirs: Vec<PathBuf>,
    /// Optional `compile_commands.json`.
    pub build_database: Option<PathBuf>,
    /// File whose build database entry supplies the include flags.
    /// Defaults to the root file.
    pub build_database_file: Option<PathBuf>,
    /// Inline each file at most once per run.
    pub inline_once: bool,
    /// Drop `#pragma once` lines.
    pub strip_pragma_once: bool,
    /// Emit `#line` directives around inlined files.
    pub emit_line_directives: bool,
    /// Emit `/* [cetest] ... */` markers.
    pub include_debug_comments: bool,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            extra_include_dirs: Vec::new(),
            build_database: None,
            build_database_file: None,
            inline_once: true,
            strip_pragma_once: true,
            emit_line_directives: true,
            include_debug_comments: false,
        }
    }
}

impl FlattenOptions {
    /// Options that leave file text untouched apart from inlining.
    pub fn plain() -> Self {
        Self {
            emit_line_directives: false,
            strip_pragma_once: false,
            ..Self::default()
        }
    }

    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_include_dirs.push(dir.into());
        self
    }

    pub fn with_build_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_database = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let o = FlattenOptions::default();
        assert!(o.inline_once);
        assert!(o.strip_pragma_once);
        assert!(o.emit_line_directives);
        assert!(!o.include_debug_comments);
        assert!(o.build_database.is_none());
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let o: FlattenOptions =
            serde_json::from_str(r#"{"include_debug_comments": true}"#).unwrap();
        assert!(o.include_debug_comments);
        assert!(o.inline_once);
    }
}
