//! Build database (`compile_commands.json`) lookup
//!
//! Headers rarely have their own entry, so lookup falls back to the entry
//! whose directory shares the longest path prefix with the selected file.
//! Such matches are reported with `exact: false`.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{FlattenError, Result};

/// Source extensions accepted as companions of a header.
pub const COMPANION_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx", "c", "mm"];

const SOURCE_LIKE_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "cxx", "m", "mm", "ixx", "cppm", "h", "hh", "hpp", "hxx",
];

const KNOWN_TOOLS: &[&str] = &[
    "cc", "c++", "gcc", "g++", "clang", "clang++", "clang-cl", "cl", "ccache", "sccache", "distcc",
];

/// Where an entry's argument vector came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgsSource {
    Arguments,
    Command,
    Unknown,
}

/// One usable entry of the database.
#[derive(Debug, Clone)]
pub struct CompileEntry {
    /// Absolute path of the translation unit
    pub file: PathBuf,
    /// Working directory of the invocation
    pub directory: Option<PathBuf>,
    arguments: Option<Vec<String>>,
    command: Option<String>,
}

impl CompileEntry {
    /// Argument vector, splitting `command` shell style when needed.
    pub fn argv(&self) -> (Vec<String>, ArgsSource) {
        if let Some(args) = &self.arguments {
            return (args.clone(), ArgsSource::Arguments);
        }
        if let Some(cmd) = &self.command {
            let args = shlex::split(cmd).unwrap_or_else(|| {
                cmd.split(' ')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            });
            return (args, ArgsSource::Command);
        }
        (Vec::new(), ArgsSource::Unknown)
    }
}

/// Include directories recovered from one compile entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeDirs {
    /// `-iquote`
    pub quote: Vec<PathBuf>,
    /// `-I`
    pub user: Vec<PathBuf>,
    /// `-isystem`, recorded but never searched
    pub system: Vec<PathBuf>,
}

/// How the selected file was matched against the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDbMatch {
    pub matched: bool,
    pub selected: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_directory: Option<PathBuf>,
    /// True only for a same-path entry
    pub exact: bool,
    /// Common path components with the matched entry
    pub score: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ArgsSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of a companion source lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionLookup {
    pub header: PathBuf,
    pub companion: Option<PathBuf>,
    pub score: usize,
    pub candidates_considered: usize,
}

/// Parsed `compile_commands.json`.
#[derive(Debug, Clone)]
pub struct BuildDatabase {
    path: PathBuf,
    entries: Vec<CompileEntry>,
}

impl BuildDatabase {
    /// Load and parse a database file.
    ///
    /// `fallback_dir` stands in for entries without a `directory`.
    pub fn load(path: &Path, fallback_dir: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(FlattenError::BuildDatabaseNotFound(path.to_path_buf()));
        }
        let invalid = |reason: String| FlattenError::InvalidBuildDatabase {
            path: path.to_path_buf(),
            reason,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
        let db = Self::from_json(path, &value, fallback_dir)
            .ok_or_else(|| invalid("must be a JSON array".to_string()))?;
        debug!(path = %path.display(), entries = db.entries.len(), "loaded build database");
        Ok(db)
    }

    /// Build from an already parsed value. `None` unless it is an array.
    pub fn from_json(path: &Path, value: &Value, fallback_dir: &Path) -> Option<Self> {
        let items = value.as_array()?;
        let entries = items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|obj| {
                let file = obj.get("file")?.as_str()?;
                if file.trim().is_empty() {
                    return None;
                }
                let directory = obj
                    .get("directory")
                    .and_then(Value::as_str)
                    .filter(|d| !d.trim().is_empty())
                    .map(PathBuf::from);
                let base = directory.clone().unwrap_or_else(|| fallback_dir.to_path_buf());
                let file = Path::new(file);
                let file = if file.is_absolute() {
                    file.to_path_buf()
                } else {
                    base.join(file)
                };

                let arguments = obj.get("arguments").and_then(Value::as_array).and_then(|a| {
                    a.iter()
                        .map(|v| v.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()
                });
                let command = obj
                    .get("command")
                    .and_then(Value::as_str)
                    .map(str::to_string);

                Some(CompileEntry {
                    file: norm_abs(&file),
                    directory,
                    arguments,
                    command,
                })
            })
            .collect();

        Some(BuildDatabase {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[CompileEntry] {
        &self.entries
    }

    /// Exact entry for `selected`, else the nearest by directory prefix.
    pub fn best_entry(&self, selected: &Path) -> Option<(&CompileEntry, bool, usize)> {
        let sel_abs = norm_abs(selected);
        let sel_key = fold(&sel_abs);
        if let Some(entry) = self.entries.iter().find(|e| fold(&e.file) == sel_key) {
            return Some((entry, true, sel_abs.components().count()));
        }

        let sel_parent = sel_abs.parent().unwrap_or(&sel_abs);
        let mut best: Option<(&CompileEntry, usize)> = None;
        for entry in &self.entries {
            let entry_parent = entry.file.parent().unwrap_or(&entry.file);
            let score = common_prefix_len(sel_parent, entry_parent);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((entry, score));
            }
        }
        best.map(|(entry, score)| (entry, false, score))
    }

    /// Include directories for `selected`, with match metadata.
    pub fn include_dirs_for(&self, selected: &Path) -> (IncludeDirs, BuildDbMatch) {
        let sel_abs = norm_abs(selected);
        let unmatched = |reason: &str| BuildDbMatch {
            matched: false,
            selected: sel_abs.clone(),
            entry_file: None,
            entry_directory: None,
            exact: false,
            score: 0,
            source: None,
            reason: Some(reason.to_string()),
        };

        let Some((entry, exact, score)) = self.best_entry(selected) else {
            return (IncludeDirs::default(), unmatched("no suitable entry found"));
        };
        if !exact && score == 0 {
            return (IncludeDirs::default(), unmatched("no suitable entry found"));
        }

        let directory = entry
            .directory
            .clone()
            .or_else(|| selected.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let (argv, source) = entry.argv();
        let dirs = parse_include_args(strip_tool_prefix(&argv), &directory);

        debug!(
            selected = %sel_abs.display(),
            entry = %entry.file.display(),
            exact,
            quote = dirs.quote.len(),
            user = dirs.user.len(),
            system = dirs.system.len(),
            "build database match"
        );

        let m = BuildDbMatch {
            matched: true,
            selected: sel_abs,
            entry_file: Some(entry.file.clone()),
            entry_directory: Some(norm_abs(&directory)),
            exact,
            score,
            source: Some(source),
            reason: None,
        };
        (dirs, m)
    }

    /// Find the translation unit that most likely owns `header`.
    ///
    /// Candidates share the header's stem (case-insensitive), carry one of
    /// [`COMPANION_EXTENSIONS`] and exist on disk. The one with the longest
    /// common directory prefix wins; earlier entries win ties.
    pub fn find_companion_source(&self, header: &Path) -> CompanionLookup {
        let header_abs = norm_abs(header);
        let stem = header_abs
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let header_dir = header_abs.parent().unwrap_or(&header_abs);

        let mut best: Option<(&Path, usize)> = None;
        let mut considered = 0;
        for entry in &self.entries {
            let ext = entry
                .file
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !COMPANION_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            let entry_stem = entry
                .file
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if entry_stem != stem || !entry.file.is_file() {
                continue;
            }

            considered += 1;
            let score = common_prefix_len(header_dir, entry.file.parent().unwrap_or(&entry.file));
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((&entry.file, score));
            }
        }

        CompanionLookup {
            header: header_abs.clone(),
            companion: best.map(|(p, _)| p.to_path_buf()),
            score: best.map_or(0, |(_, s)| s),
            candidates_considered: considered,
        }
    }
}

/// Convenience wrapper: load `db_path` and look up a companion for `header`.
pub fn find_companion_source(db_path: &Path, header: &Path) -> Result<CompanionLookup> {
    let fallback = header.parent().unwrap_or(Path::new("."));
    let db = BuildDatabase::load(db_path, fallback)?;
    Ok(db.find_companion_source(header))
}

/// Drop leading compiler/wrapper tokens (ccache, sccache, distcc, the
/// compiler itself).
pub fn strip_tool_prefix(args: &[String]) -> &[String] {
    let skip = args.iter().take_while(|a| looks_like_tool(a)).count();
    &args[skip..]
}

fn looks_like_tool(token: &str) -> bool {
    if token.is_empty() || token.starts_with('-') || token.starts_with('@') {
        return false;
    }
    let base = Path::new(token)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = Path::new(&base)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if SOURCE_LIKE_EXTENSIONS.contains(&ext.as_str()) {
        return false;
    }
    KNOWN_TOOLS.contains(&base.as_str())
        || base.starts_with("clang")
        || base.starts_with("gcc")
        || base.starts_with("g++")
}

/// Collect `-I`, `-iquote` and `-isystem` directories (joined and
/// separate forms). Relative paths resolve against `directory`.
pub fn parse_include_args(args: &[String], directory: &Path) -> IncludeDirs {
    let mut out = IncludeDirs::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        let mut take = |flag: &str| -> Option<String> {
            if arg == flag {
                i += 1;
                args.get(i).cloned()
            } else {
                arg.strip_prefix(flag)
                    .filter(|rest| !rest.is_empty())
                    .map(str::to_string)
            }
        };

        if let Some(v) = take("-isystem") {
            out.system.push(resolve_dir(&v, directory));
        } else if let Some(v) = take("-iquote") {
            out.quote.push(resolve_dir(&v, directory));
        } else if let Some(v) = take("-I") {
            out.user.push(resolve_dir(&v, directory));
        }
        i += 1;
    }
    out
}

fn resolve_dir(raw: &str, directory: &Path) -> PathBuf {
    let p = PathBuf::from(raw.trim().trim_matches('"'));
    let p = if p.is_absolute() { p } else { directory.join(p) };
    norm_abs(&p)
}

/// Canonical absolute path, or a lexically absolute one if the file is gone.
pub fn norm_abs(p: &Path) -> PathBuf {
    std::fs::canonicalize(p)
        .or_else(|_| std::path::absolute(p))
        .unwrap_or_else(|_| p.to_path_buf())
}

fn fold(p: &Path) -> String {
    p.to_string_lossy().to_lowercase()
}

/// Count of leading path components equal ignoring case.
pub fn common_prefix_len(a: &Path, b: &Path) -> usize {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| component_eq(x, y))
        .count()
}

fn component_eq(a: &Component<'_>, b: &Component<'_>) -> bool {
    a.as_os_str().to_string_lossy().to_lowercase() == b.as_os_str().to_string_lossy().to_lowercase()
}
