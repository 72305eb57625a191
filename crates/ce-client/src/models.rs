//! Catalog records and compile request/response types
//!
//! Catalog parsing is deliberately lenient: the service's JSON is external
//! data, so malformed entries are skipped rather than failing the whole list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::semver::SemverKey;

/// Result code recorded when a compile request timed out.
pub const CODE_TIMEOUT: i32 = -100;
/// Result code recorded when a compile request failed in transport.
pub const CODE_TRANSPORT_ERROR: i32 = -101;
/// Result code recorded when a compile request was aborted by the user.
pub const CODE_ABORTED: i32 = -102;

/// One compiler from the remote catalog. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilerRecord {
    pub id: String,
    pub name: String,
    pub lang: String,
    /// Raw `compilerType` field, vendor-specific spelling
    pub compiler_type: String,
    pub semver: Option<String>,
    pub instruction_set: Option<String>,
}

impl CompilerRecord {
    pub fn semver_key(&self) -> SemverKey {
        SemverKey::parse(self.semver.as_deref())
    }
}

/// One library from the remote catalog, versions newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub id: String,
    pub name: String,
    pub versions: Vec<String>,
}

/// A library attached to a compile request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LibrarySelection {
    pub id: String,
    pub version: String,
}

impl LibrarySelection {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            version: version.into().trim().to_string(),
        }
    }
}

/// Everything needed to compile one snippet with one compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub compiler_id: String,
    pub source: String,
    pub user_arguments: String,
    pub libraries: Vec<LibrarySelection>,
}

/// Normalized compile result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResponse {
    /// Compiler exit code, 0 on success
    pub code: i32,
    /// Diagnostics joined with newlines and trimmed
    pub stderr: String,
}

impl CompileResponse {
    pub fn ok(&self) -> bool {
        self.code == 0
    }

    /// Normalize a raw `/compile` response body.
    pub fn from_json(value: &Value) -> Self {
        let code = value
            .get("code")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or(-1);
        CompileResponse {
            code,
            stderr: stderr_text(value),
        }
    }
}

/// Join the `stderr` array of a compile response into one string.
pub fn stderr_text(value: &Value) -> String {
    let Some(parts) = value.get("stderr").and_then(Value::as_array) else {
        return String::new();
    };
    let lines: Vec<String> = parts
        .iter()
        .filter_map(|it| match it {
            Value::Object(obj) => obj.get("text").map(value_to_string),
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    lines.join("\n").trim().to_string()
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn opt_string(v: Option<&Value>) -> Option<String> {
    match v {
        None | Some(Value::Null) => None,
        Some(other) => Some(value_to_string(other)),
    }
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key).map(value_to_string).unwrap_or_default()
}

/// Unwrap `{ "<key>": [...] }` envelopes some deployments return.
fn unwrap_list<'a>(value: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(obj) => obj.get(key).and_then(Value::as_array),
        _ => None,
    }
}

/// Parse the compiler catalog, keeping only usable C++ compilers.
///
/// Drops entries without an id, with `lang != "c++"`, or whose name marks
/// them as wine-hosted ("ex-wine").
pub fn parse_compiler_catalog(value: &Value) -> Vec<CompilerRecord> {
    let Some(items) = unwrap_list(value, "compilers") else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let id = str_field(obj, "id");
            let lang = str_field(obj, "lang");
            let name = str_field(obj, "name");
            if id.is_empty() || lang != "c++" || name.to_lowercase().contains("ex-wine") {
                return None;
            }
            Some(CompilerRecord {
                id,
                name,
                lang,
                compiler_type: str_field(obj, "compilerType"),
                semver: opt_string(obj.get("semver")),
                instruction_set: opt_string(obj.get("instructionSet")),
            })
        })
        .collect()
}

/// Parse the library catalog.
///
/// Versions may be strings, `{id}`/`{version}` objects, or an object keyed
/// by version. Libraries without id or versions are dropped. Versions are
/// sorted newest first, libraries by case-folded name.
pub fn parse_library_catalog(value: &Value) -> Vec<LibraryInfo> {
    let Some(items) = unwrap_list(value, "libraries") else {
        return Vec::new();
    };

    let mut out: Vec<LibraryInfo> = items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let id = str_field(obj, "id");
            let name = obj
                .get("name")
                .map(value_to_string)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| id.clone());

            let raw_versions: Vec<String> = match obj.get("versions") {
                Some(Value::Array(vs)) => vs
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| match v {
                        Value::Object(vo) => vo
                            .get("id")
                            .or_else(|| vo.get("version"))
                            .map(value_to_string)
                            .unwrap_or_else(|| v.to_string()),
                        other => value_to_string(other),
                    })
                    .collect(),
                Some(Value::Object(map)) => map.keys().cloned().collect(),
                _ => Vec::new(),
            };

            let mut versions: Vec<String> = raw_versions
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            if id.is_empty() || versions.is_empty() {
                return None;
            }
            versions.sort_by(|a, b| SemverKey::parse(Some(b)).cmp(&SemverKey::parse(Some(a))));
            Some(LibraryInfo { id, name, versions })
        })
        .collect();

    out.sort_by_key(|lib| lib.name.to_lowercase());
    out
}
