//! Probe results: one attempt per tested compiler, one summary per group.

use ce_client::{CompilerRecord, SemverKey, CODE_ABORTED, CODE_TRANSPORT_ERROR};
use serde::{Deserialize, Serialize};

use crate::classify::GroupKey;

/// Outcome of compiling the snippet with one compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "AttemptWire", from = "AttemptWire")]
pub struct CompileAttempt {
    pub family: String,
    pub platform: String,
    pub series: String,
    pub compiler_id: String,
    pub compiler_name: String,
    pub semver: Option<String>,
    /// 0 on success; negative sentinels for timeout, transport error and
    /// abort; anything else is a compiler-reported failure
    pub code: i32,
    pub stderr: String,
}

impl CompileAttempt {
    pub fn new(key: &GroupKey, compiler: &CompilerRecord, code: i32, stderr: String) -> Self {
        Self {
            family: key.family.clone(),
            platform: key.platform.clone(),
            series: key.series.clone(),
            compiler_id: compiler.id.clone(),
            compiler_name: compiler.name.clone(),
            semver: compiler.semver.clone(),
            code,
            stderr,
        }
    }

    /// Placeholder for a group whose probe failed outside any compile.
    pub fn probe_error(key: &GroupKey, message: &str) -> Self {
        Self {
            family: key.family.clone(),
            platform: key.platform.clone(),
            series: key.series.clone(),
            compiler_id: String::new(),
            compiler_name: "(probe error)".into(),
            semver: None,
            code: CODE_TRANSPORT_ERROR,
            stderr: message.to_string(),
        }
    }

    pub fn ok(&self) -> bool {
        self.code == 0
    }

    pub fn semver_key(&self) -> SemverKey {
        SemverKey::parse(self.semver.as_deref())
    }

    /// `name (semver)` for tables and logs.
    pub fn label(&self) -> String {
        format!(
            "{} ({})",
            self.compiler_name,
            self.semver.as_deref().unwrap_or("unknown")
        )
    }
}

/// Report wire shape of an attempt; carries a derived `ok` field.
#[derive(Serialize, Deserialize)]
struct AttemptWire {
    #[serde(default = "unknown")]
    platform: String,
    #[serde(default)]
    series: String,
    #[serde(default = "unknown")]
    family: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    semver: Option<String>,
    #[serde(default = "missing_code")]
    code: i32,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    stderr: String,
}

fn unknown() -> String {
    "unknown".into()
}

fn missing_code() -> i32 {
    -1
}

impl From<CompileAttempt> for AttemptWire {
    fn from(a: CompileAttempt) -> Self {
        AttemptWire {
            ok: a.ok(),
            platform: a.platform,
            series: a.series,
            family: a.family,
            id: a.compiler_id,
            name: a.compiler_name,
            semver: a.semver,
            code: a.code,
            stderr: a.stderr,
        }
    }
}

impl From<AttemptWire> for CompileAttempt {
    fn from(w: AttemptWire) -> Self {
        // `ok` is derived from `code` and ignored on read.
        CompileAttempt {
            family: w.family,
            platform: w.platform,
            series: w.series,
            compiler_id: w.id,
            compiler_name: w.name,
            semver: w.semver,
            code: w.code,
            stderr: w.stderr,
        }
    }
}

/// Result of probing one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    #[serde(flatten)]
    pub key: GroupKey,
    /// Newest compiler that accepted the snippet
    #[serde(default)]
    pub highest_supported: Option<CompileAttempt>,
    /// Oldest compiler that accepted the snippet
    #[serde(default)]
    pub lowest_supported: Option<CompileAttempt>,
    /// Oldest tested compiler that rejected it (or the faulting attempt)
    #[serde(default)]
    pub first_failure: Option<CompileAttempt>,
    /// Every attempt made, in candidate order
    #[serde(default)]
    pub attempts: Vec<CompileAttempt>,
    /// Set when a fault prevented a definitive boundary
    #[serde(default)]
    pub inconclusive_reason: Option<String>,
}

/// Coarse outcome of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Supported,
    NoSuccess,
    Inconclusive,
}

impl GroupSummary {
    pub fn empty(key: GroupKey) -> Self {
        Self {
            key,
            highest_supported: None,
            lowest_supported: None,
            first_failure: None,
            attempts: Vec::new(),
            inconclusive_reason: None,
        }
    }

    /// Summary for a group whose probe raised a non-cancel error.
    pub fn probe_error(key: GroupKey, message: &str) -> Self {
        let failure = CompileAttempt::probe_error(&key, message);
        Self {
            first_failure: Some(failure),
            inconclusive_reason: Some(format!("probe error: {message}")),
            ..Self::empty(key)
        }
    }

    pub fn is_inconclusive(&self) -> bool {
        self.inconclusive_reason.is_some()
    }

    /// The search was cancelled before it could finish.
    pub fn is_aborted(&self) -> bool {
        self.is_inconclusive()
            && self
                .first_failure
                .as_ref()
                .is_some_and(|a| a.code == CODE_ABORTED)
    }

    pub fn status(&self) -> GroupStatus {
        if self.is_inconclusive() {
            GroupStatus::Inconclusive
        } else if self.highest_supported.is_none() {
            GroupStatus::NoSuccess
        } else {
            GroupStatus::Supported
        }
    }
}

/// Oldest conclusive `lowest_supported` across groups, by semver.
///
/// Inconclusive groups and attempts without a semver are ignored.
pub fn overall_lowest(summaries: &[GroupSummary]) -> Option<&CompileAttempt> {
    summaries
        .iter()
        .filter(|s| !s.is_inconclusive())
        .filter_map(|s| s.lowest_supported.as_ref())
        .filter(|a| a.semver.as_deref().is_some_and(|v| !v.trim().is_empty()))
        .min_by_key(|a| a.semver_key())
}
