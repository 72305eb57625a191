//! Scoped library attachment rules

use std::collections::{HashMap, HashSet};

use ce_client::LibrarySelection;
use serde::{Deserialize, Serialize};

/// What a [`LibraryRule`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    All,
    Family,
    Compiler,
}

impl RuleScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Some(RuleScope::All),
            "family" => Some(RuleScope::Family),
            "compiler" => Some(RuleScope::Compiler),
            _ => None,
        }
    }
}

/// Attach library `id@version` to every compiler in scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryRule {
    pub scope: RuleScope,
    /// Family name or compiler id; empty for [`RuleScope::All`]
    #[serde(default)]
    pub target: String,
    pub id: String,
    pub version: String,
}

impl LibraryRule {
    pub fn all(id: &str, version: &str) -> Self {
        Self::new(RuleScope::All, "", id, version)
    }

    pub fn family(family: &str, id: &str, version: &str) -> Self {
        Self::new(RuleScope::Family, family, id, version)
    }

    pub fn compiler(compiler_id: &str, id: &str, version: &str) -> Self {
        Self::new(RuleScope::Compiler, compiler_id, id, version)
    }

    fn new(scope: RuleScope, target: &str, id: &str, version: &str) -> Self {
        Self {
            scope,
            target: target.trim().to_string(),
            id: id.trim().to_string(),
            version: version.trim().to_string(),
        }
    }

    fn matches(&self, family: &str, compiler_id: &str) -> bool {
        match self.scope {
            RuleScope::All => true,
            RuleScope::Family => self.target == family,
            RuleScope::Compiler => self.target == compiler_id,
        }
    }
}

/// A rule as written in a config file, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLibraryRule {
    pub scope: String,
    pub target: String,
    #[serde(alias = "lib_id")]
    pub id: String,
    pub version: String,
}

/// Validate raw rules.
///
/// Drops unknown scopes, missing ids or versions, and family/compiler rules
/// without a target. `all` rules lose their target. Exact duplicates are
/// removed keeping the first.
pub fn clean_rules(raw: &[RawLibraryRule]) -> Vec<LibraryRule> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|r| {
            let scope = RuleScope::parse(&r.scope)?;
            let id = r.id.trim();
            let version = r.version.trim();
            if id.is_empty() || version.is_empty() {
                return None;
            }
            let target = match scope {
                RuleScope::All => "",
                _ => r.target.trim(),
            };
            if scope != RuleScope::All && target.is_empty() {
                return None;
            }
            Some(LibraryRule::new(scope, target, id, version))
        })
        .filter(|rule| seen.insert(rule.clone()))
        .collect()
}

/// Libraries to attach when compiling with `compiler_id` of `family`.
///
/// Rules apply by increasing specificity (all, family, compiler); a later
/// rule for the same library replaces the version but keeps the library's
/// first-seen position.
pub fn effective_libraries(
    rules: &[LibraryRule],
    family: &str,
    compiler_id: &str,
) -> Vec<LibrarySelection> {
    let family = family.trim();
    let compiler_id = compiler_id.trim();

    let mut order: Vec<&str> = Vec::new();
    let mut chosen: HashMap<&str, &str> = HashMap::new();

    for scope in [RuleScope::All, RuleScope::Family, RuleScope::Compiler] {
        for rule in rules
            .iter()
            .filter(|r| r.scope == scope && r.matches(family, compiler_id))
        {
            let id = rule.id.trim();
            let version = rule.version.trim();
            if id.is_empty() || version.is_empty() {
                continue;
            }
            if chosen.insert(id, version).is_none() {
                order.push(id);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| chosen.get(id).map(|v| LibrarySelection::new(id, *v)))
        .collect()
}
