//! Quoted-include inliner
//!
//! Depth-first over `#include "..."` lines only. Angle includes pass
//! through untouched. Unresolved includes stay in the output verbatim and
//! are counted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::build_db::{norm_abs, BuildDatabase, BuildDbMatch};
use crate::error::{FlattenError, Result};
use crate::options::FlattenOptions;

static QUOTED_INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*#\s*include\s*"([^"]+)""#).expect("QUOTED_INCLUDE_RE regex should compile")
});

static PRAGMA_ONCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#\s*pragma\s+once\b").expect("PRAGMA_ONCE_RE regex should compile")
});

/// Counters and search context of one flatten run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenStats {
    pub files_inlined: usize,
    pub include_lines_seen: usize,
    pub include_lines_inlined: usize,
    pub include_lines_unresolved: usize,
    pub root: PathBuf,
    pub build_database: Option<PathBuf>,
    /// File used for the database lookup (root unless overridden)
    pub build_database_file: PathBuf,
    pub build_database_match: Option<BuildDbMatch>,
    pub quote_dirs: Vec<PathBuf>,
    pub user_include_dirs: Vec<PathBuf>,
    pub system_include_dirs_ignored: Vec<PathBuf>,
    pub extra_include_dirs: Vec<PathBuf>,
    /// Combined, deduplicated search order after the including directory
    pub search_dirs: Vec<PathBuf>,
}

/// Output of [`flatten`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flattened {
    pub text: String,
    pub stats: FlattenStats,
}

/// Flatten `root` into one translation unit.
pub fn flatten(root: &Path, options: &FlattenOptions) -> Result<Flattened> {
    if !root.is_file() {
        return Err(FlattenError::FileNotFound(root.to_path_buf()));
    }
    let root_dir = root.parent().unwrap_or(Path::new("."));

    let mut stats = FlattenStats {
        root: root.to_path_buf(),
        build_database: options.build_database.clone(),
        build_database_file: options
            .build_database_file
            .clone()
            .unwrap_or_else(|| root.to_path_buf()),
        ..FlattenStats::default()
    };

    if let Some(db_path) = options.build_database.as_deref() {
        if !db_path.as_os_str().is_empty() {
            let db = BuildDatabase::load(db_path, root_dir)?;
            let (dirs, m) = db.include_dirs_for(&stats.build_database_file);
            stats.quote_dirs = dirs.quote;
            stats.user_include_dirs = dirs.user;
            stats.system_include_dirs_ignored = dirs.system;
            stats.build_database_match = Some(m);
        }
    }

    stats.extra_include_dirs = options
        .extra_include_dirs
        .iter()
        .map(|d| {
            if d.is_absolute() {
                d.clone()
            } else {
                root_dir.join(d)
            }
        })
        .map(|d| norm_abs(&d))
        .filter(|d| d.is_dir())
        .collect();

    for dir in stats
        .quote_dirs
        .iter()
        .chain(&stats.user_include_dirs)
        .chain(&stats.extra_include_dirs)
    {
        if !stats.search_dirs.contains(dir) {
            stats.search_dirs.push(dir.clone());
        }
    }

    debug!(
        root = %root.display(),
        search_dirs = stats.search_dirs.len(),
        inline_once = options.inline_once,
        "flattening translation unit"
    );

    let mut flattener = Flattener {
        options,
        search_dirs: stats.search_dirs.clone(),
        stack: Vec::new(),
        inlined: HashSet::new(),
        out: String::new(),
        stats,
    };
    flattener.inline_file(root)?;

    debug!(
        files = flattener.stats.files_inlined,
        inlined = flattener.stats.include_lines_inlined,
        unresolved = flattener.stats.include_lines_unresolved,
        bytes = flattener.out.len(),
        "flatten complete"
    );

    Ok(Flattened {
        text: flattener.out,
        stats: flattener.stats,
    })
}

struct Flattener<'a> {
    options: &'a FlattenOptions,
    search_dirs: Vec<PathBuf>,
    /// Canonical paths of files currently being inlined
    stack: Vec<PathBuf>,
    /// Canonical paths of every file entered so far
    inlined: HashSet<PathBuf>,
    out: String,
    stats: FlattenStats,
}

impl Flattener<'_> {
    fn inline_file(&mut self, path: &Path) -> Result<()> {
        let key = norm_abs(path);
        let shown = escape_for_line(path);

        if self.stack.contains(&key) {
            trace!(path = %path.display(), "include cycle");
            if self.options.include_debug_comments {
                self.out
                    .push_str(&format!("/* [cetest] include cycle detected: \"{shown}\" */\n"));
            }
            return Ok(());
        }
        if self.options.inline_once && self.inlined.contains(&key) {
            if self.options.include_debug_comments {
                self.out
                    .push_str(&format!("/* [cetest] skipped duplicate include: \"{shown}\" */\n"));
            }
            return Ok(());
        }

        let text = read_source(path)?;
        self.stack.push(key.clone());
        self.inlined.insert(key);
        self.stats.files_inlined += 1;

        if self.options.include_debug_comments {
            self.out
                .push_str(&format!("/* [cetest] begin inlined file: {shown} */\n"));
        }
        if self.options.emit_line_directives {
            self.out.push_str(&format!("#line 1 \"{shown}\"\n"));
        }

        for (idx, line) in text.split_inclusive('\n').enumerate() {
            if self.options.strip_pragma_once && PRAGMA_ONCE_RE.is_match(line) {
                continue;
            }
            let Some(name) = QUOTED_INCLUDE_RE.captures(line).and_then(|c| c.get(1)) else {
                self.out.push_str(line);
                continue;
            };
            let name = name.as_str();

            self.stats.include_lines_seen += 1;
            let Some(resolved) = self.resolve(name, path) else {
                trace!(include = name, from = %path.display(), "unresolved include");
                self.stats.include_lines_unresolved += 1;
                self.out.push_str(line);
                continue;
            };

            self.stats.include_lines_inlined += 1;
            if self.options.include_debug_comments {
                self.out.push_str(&format!(
                    "/* [cetest] inlined: \"{name}\" -> \"{}\" */\n",
                    escape_for_line(&resolved)
                ));
            }
            self.inline_file(&resolved)?;
            if self.options.emit_line_directives {
                self.out.push_str(&format!("#line {} \"{shown}\"\n", idx + 2));
            }
        }

        // Keep the next directive on its own line.
        let nested = self.stack.len() > 1;
        if (nested || self.options.include_debug_comments)
            && !self.out.is_empty()
            && !self.out.ends_with('\n')
        {
            self.out.push('\n');
        }
        if self.options.include_debug_comments {
            self.out
                .push_str(&format!("/* [cetest] end inlined file: {shown} */\n"));
        }
        self.stack.pop();
        Ok(())
    }

    /// Including file's directory first, then the search list.
    fn resolve(&self, name: &str, including: &Path) -> Option<PathBuf> {
        let local = including.parent().unwrap_or(Path::new(".")).join(name);
        if local.is_file() {
            return Some(local);
        }
        self.search_dirs
            .iter()
            .map(|d| d.join(name))
            .find(|p| p.is_file())
    }
}

/// Read a source file: UTF-8 with BOM stripped, lossy on invalid bytes,
/// rejected if it contains NUL.
pub fn read_source(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    decode_source(path, &bytes)
}

fn decode_source(path: &Path, bytes: &[u8]) -> Result<String> {
    if bytes.contains(&0) {
        return Err(FlattenError::BinaryFile(path.to_path_buf()));
    }
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn escape_for_line(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "\\\\").replace('"', "\\\"")
}
