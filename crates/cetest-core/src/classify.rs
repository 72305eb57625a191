//! Compiler classification and grouping
//!
//! Maps catalog records onto `(family, platform, series)` group keys. Every
//! function here is total: catalog data is external, so anything
//! unrecognized lands on `"unknown"` rather than an error.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use ce_client::CompilerRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Series label for records without a usable display name.
pub const UNKNOWN_SERIES: &str = "(unknown series)";

static ICPX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bicpx\b").expect("ICPX_RE regex should compile"));
static ICX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bicx\b").expect("ICX_RE regex should compile"));
static ICC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bicc\b").expect("ICC_RE regex should compile"));
static GCC_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bgcc\b").expect("GCC_WORD_RE regex should compile"));
static CL_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bcl\b").expect("CL_WORD_RE regex should compile"));

static ARM_GCC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*arm\s+gcc\b").expect("ARM_GCC_RE regex should compile"));
static ARM64_MSVC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*arm64\s+msvc\b").expect("ARM64_MSVC_RE regex should compile")
});
static ARM_MSVC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*arm\s+msvc\b").expect("ARM_MSVC_RE regex should compile"));

/// Architecture patterns in priority order; some tokens nest in others.
static PLATFORM_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("armv7-a", r"\barmv7[-\s]?a\b|\barmv7\b"),
        ("aarch64", r"\baarch64\b|\barm64\b"),
        ("x86-64", r"\bx86[-_]?64\b|\bamd64\b|\bx64\b"),
        ("x86", r"\bx86\b|\bi686\b"),
        ("riscv64", r"\briscv64\b"),
        ("ppc64le", r"\bppc64le\b"),
        ("s390x", r"\bs390x\b"),
        ("wasm32", r"\bwasm32\b"),
        ("wasm64", r"\bwasm64\b"),
        ("msp430", r"\bmsp430\b"),
        ("avr", r"\bavr\b"),
        ("6502", r"\b6502\b"),
        ("mips64", r"\bmips64\b"),
        ("mips", r"\bmips\b"),
        ("hexagon", r"\bhexagon\b"),
        ("qnx", r"\bqnx\b"),
    ]
    .into_iter()
    .map(|(canon, rx)| (canon, Regex::new(rx).expect("platform regex should compile")))
    .collect()
});

static SERIES_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\((?:trunk|head|snapshot|nightly|git)\)\s*$")
        .expect("SERIES_TAG_RE regex should compile")
});
static SERIES_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+v?\d+(?:\.\d+){0,3}(?:[^\w].*)?$")
        .expect("SERIES_VERSION_RE regex should compile")
});

/// Normalize a raw `compilerType` token.
///
/// Returns `"unknown"` for empty input, `"intel"` for generic Intel
/// spellings, and the lowercased token itself when nothing matches.
pub fn normalize_family_token(token: &str) -> String {
    let ct = token.trim().to_lowercase();
    if ct.is_empty() {
        return "unknown".into();
    }
    if ct.contains("nvc++") || ct.contains("nvhpc") {
        return "nvc++".into();
    }

    let exact = match ct.as_str() {
        "clang-intel" => Some("intel-icx"),
        "clang-cl" => Some("clang-cl"),
        "win32-mingw-gcc" => Some("mingw-gcc"),
        "win32-mingw-clang" => Some("mingw-clang"),
        "win32-vc" => Some("msvc"),
        _ => None,
    };
    if let Some(f) = exact {
        return f.into();
    }

    if ct.contains("icpx") || ct.contains("icx") {
        return "intel-icx".into();
    }
    if ct.contains("icc") {
        return "intel-icc".into();
    }
    if ct.contains("gcc") || ct.contains("g++") || matches!(ct.as_str(), "gpp" | "gxx" | "gnu") {
        return "gcc".into();
    }
    if ct.contains("clang") {
        return "clang".into();
    }
    if ct.contains("msvc") || ct.contains("visual") || matches!(ct.as_str(), "cl" | "vc") {
        return "msvc".into();
    }
    if ct.contains("intel") {
        return "intel".into();
    }
    ct
}

/// Compiler family of a catalog record.
pub fn family(record: &CompilerRecord) -> String {
    let fam = normalize_family_token(&record.compiler_type);
    let hay = format!("{} {} {}", record.name, record.id, record.compiler_type).to_lowercase();

    if hay.contains("nvc++") || hay.contains("nvhpc") {
        return "nvc++".into();
    }
    if matches!(fam.as_str(), "clang-cl" | "mingw-gcc" | "mingw-clang" | "msvc") {
        return fam;
    }

    if ICPX_RE.is_match(&hay)
        || hay.contains("oneapi")
        || hay.contains("dpc++")
        || hay.contains("dpcpp")
        || ICX_RE.is_match(&hay)
        || hay.contains("intel icx")
    {
        return "intel-icx".into();
    }
    if ICC_RE.is_match(&hay) || hay.contains("intel icc") {
        return "intel-icc".into();
    }

    if fam != "unknown" && fam != "intel" {
        return fam;
    }

    let mingw = hay.contains("mingw");
    if hay.contains("g++") || GCC_WORD_RE.is_match(&hay) || hay.contains("gcc-") || mingw {
        let fam = if mingw { "mingw-gcc" } else { "gcc" };
        return fam.into();
    }
    if hay.contains("clang") {
        let fam = if mingw { "mingw-clang" } else { "clang" };
        return fam.into();
    }
    if hay.contains("msvc")
        || hay.contains("win32")
        || hay.contains("visual studio")
        || CL_WORD_RE.is_match(&hay)
    {
        return "msvc".into();
    }

    match record.id.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('g') => "gcc".into(),
        Some('c') => "clang".into(),
        _ if fam == "intel" => "intel".into(),
        _ => "unknown".into(),
    }
}

/// Canonical platform name for an `instructionSet` value.
pub fn normalize_platform(instruction_set: Option<&str>) -> String {
    let s = instruction_set.unwrap_or("").trim();
    if s.is_empty() {
        return "unknown".into();
    }
    match s.to_lowercase().as_str() {
        "amd64" | "x86_64" | "x86-64" | "x64" => "x86-64".into(),
        "arm64" => "aarch64".into(),
        _ => s.to_string(),
    }
}

fn platform_from_name(name: &str) -> Option<&'static str> {
    let s = name.to_lowercase();
    if ARM_GCC_RE.is_match(&s) {
        return Some("arm");
    }
    if ARM64_MSVC_RE.is_match(&s) {
        return Some("aarch64");
    }
    if ARM_MSVC_RE.is_match(&s) {
        return Some("arm");
    }
    PLATFORM_PATTERNS
        .iter()
        .find(|(_, rx)| rx.is_match(&s))
        .map(|(canon, _)| *canon)
}

fn platform_from_id(id: &str) -> Option<&'static str> {
    let s = id.trim().to_lowercase();
    if s.is_empty() {
        return None;
    }
    if s.starts_with("arm") {
        Some("arm")
    } else if s.starts_with("msp430") {
        Some("msp430")
    } else if s.starts_with("avr") {
        Some("avr")
    } else if s.contains("6502") {
        Some("6502")
    } else if s.starts_with("hexagon") {
        Some("hexagon")
    } else if s.starts_with("qnx") {
        Some("qnx")
    } else {
        None
    }
}

/// Target platform of a catalog record.
pub fn platform(record: &CompilerRecord) -> String {
    let normalized = normalize_platform(record.instruction_set.as_deref());
    if normalized != "unknown" {
        return normalized;
    }
    platform_from_name(&record.name)
        .or_else(|| platform_from_id(&record.id))
        .unwrap_or("unknown")
        .to_string()
}

/// Version series of a catalog record: the display name minus its version.
pub fn series(record: &CompilerRecord) -> String {
    let mut name = record.name.trim().to_string();
    if name.is_empty() {
        return UNKNOWN_SERIES.into();
    }

    let sem = record.semver.as_deref().unwrap_or("").trim();
    if !sem.is_empty() {
        if let Some(pos) = name.rfind(sem) {
            let stripped = format!("{}{}", &name[..pos], &name[pos + sem.len()..]);
            let stripped = stripped.trim();
            if !stripped.is_empty() {
                name = stripped.to_string();
            }
        }
    }

    let name = SERIES_TAG_RE.replace(&name, "").trim().to_string();
    let name = SERIES_VERSION_RE.replace(&name, "").trim().to_string();
    if name.is_empty() {
        UNKNOWN_SERIES.into()
    } else {
        name
    }
}

/// Display priority of a family; unknown families sort last.
pub fn family_sort_key(family: &str) -> (u8, String) {
    let pri = match family {
        "gcc" => 0,
        "mingw-gcc" => 1,
        "clang" => 2,
        "mingw-clang" => 3,
        "clang-cl" => 4,
        "msvc" => 5,
        "intel-icx" => 6,
        "intel-icc" => 7,
        "nvc++" => 8,
        _ => 50,
    };
    (pri, family.to_lowercase())
}

/// A `(family, platform, series)` partition of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub family: String,
    pub platform: String,
    pub series: String,
}

impl GroupKey {
    pub fn new(
        family: impl Into<String>,
        platform: impl Into<String>,
        series: impl Into<String>,
    ) -> Self {
        Self {
            family: family.into(),
            platform: platform.into(),
            series: series.into(),
        }
    }

    pub fn of(record: &CompilerRecord) -> Self {
        Self::new(family(record), platform(record), series(record))
    }

    /// Probe ordering: family priority, then platform and series
    /// case-folded.
    pub fn job_order(&self) -> ((u8, String), String, String) {
        (
            family_sort_key(&self.family),
            self.platform.to_lowercase(),
            self.series.to_lowercase(),
        )
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.family, self.platform, self.series)
    }
}

/// One group ready to probe, candidates newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeJob {
    pub key: GroupKey,
    pub compilers: Vec<CompilerRecord>,
}

/// Catalog-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub compilers: usize,
    pub groups: usize,
    pub platforms: usize,
    pub per_family: BTreeMap<String, usize>,
}

/// family -> platform -> series -> compiler count
pub type GroupTree = BTreeMap<String, BTreeMap<String, BTreeMap<String, usize>>>;

/// The catalog partitioned into groups.
#[derive(Debug, Clone, Default)]
pub struct CompilerGroups {
    groups: BTreeMap<GroupKey, Vec<CompilerRecord>>,
}

/// Partition `records` into groups, each sorted newest first.
pub fn group_compilers(records: &[CompilerRecord]) -> CompilerGroups {
    let mut groups: BTreeMap<GroupKey, Vec<CompilerRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(GroupKey::of(record))
            .or_default()
            .push(record.clone());
    }
    for list in groups.values_mut() {
        list.sort_by(|a, b| {
            b.semver_key()
                .cmp(&a.semver_key())
                .then_with(|| a.id.cmp(&b.id))
        });
    }
    CompilerGroups { groups }
}

impl CompilerGroups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &GroupKey) -> Option<&[CompilerRecord]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &Vec<CompilerRecord>)> {
        self.groups.iter()
    }

    pub fn tree(&self) -> GroupTree {
        let mut tree = GroupTree::new();
        for (key, list) in &self.groups {
            tree.entry(key.family.clone())
                .or_default()
                .entry(key.platform.clone())
                .or_default()
                .insert(key.series.clone(), list.len());
        }
        tree
    }

    pub fn stats(&self) -> CatalogStats {
        let mut per_family = BTreeMap::new();
        let mut platforms = BTreeSet::new();
        let mut compilers = 0;
        for (key, list) in &self.groups {
            *per_family.entry(key.family.clone()).or_insert(0) += list.len();
            platforms.insert(key.platform.as_str());
            compilers += list.len();
        }
        CatalogStats {
            compilers,
            groups: self.groups.len(),
            platforms: platforms.len(),
            per_family,
        }
    }

    /// Expand selectors into concrete group keys.
    ///
    /// Accepts `family`, `family|platform` and `family|platform|series`. A
    /// full key that no longer exists expands to every series under its
    /// platform. Legacy `icx`/`icc` family names are migrated.
    pub fn select(&self, selectors: &[String]) -> BTreeSet<GroupKey> {
        let mut out = BTreeSet::new();
        for selector in selectors {
            let parts: Vec<&str> = selector
                .split('|')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            let Some(first) = parts.first() else {
                continue;
            };
            let fam = canonical_family_name(first);

            match parts.len() {
                1 => out.extend(self.keys_under(&fam, None)),
                2 => out.extend(self.keys_under(&fam, Some(parts[1]))),
                _ => {
                    let key = GroupKey::new(fam.clone(), parts[1], parts[2..].join("|"));
                    if self.groups.contains_key(&key) {
                        out.insert(key);
                    } else {
                        out.extend(self.keys_under(&fam, Some(parts[1])));
                    }
                }
            }
        }
        out
    }

    fn keys_under(&self, fam: &str, platform: Option<&str>) -> Vec<GroupKey> {
        self.groups
            .keys()
            .filter(|k| k.family == fam && platform.map_or(true, |p| k.platform == p))
            .cloned()
            .collect()
    }

    /// Probe jobs for `keys`, in probe order. Unknown keys are skipped.
    pub fn jobs(&self, keys: &BTreeSet<GroupKey>) -> Vec<ProbeJob> {
        let mut jobs: Vec<ProbeJob> = keys
            .iter()
            .filter_map(|k| {
                self.groups.get(k).map(|list| ProbeJob {
                    key: k.clone(),
                    compilers: list.clone(),
                })
            })
            .collect();
        jobs.sort_by_key(|j| j.key.job_order());
        jobs
    }
}

fn canonical_family_name(fam: &str) -> String {
    match fam {
        "icx" => "intel-icx".into(),
        "icc" => "intel-icc".into(),
        other => other.to_string(),
    }
}
