//! Per-family compiler argument construction

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classify::GroupKey;

/// Argument dialect of a compiler family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagStyle {
    Gnu,
    Msvc,
}

impl FlagStyle {
    pub fn for_family(family: &str) -> Self {
        match family.trim().to_lowercase().as_str() {
            "msvc" | "clang-cl" => FlagStyle::Msvc,
            _ => FlagStyle::Gnu,
        }
    }
}

/// Syntax-check-only flags selecting `std` for `family`.
pub fn std_flags_for_family(family: &str, std: &str) -> String {
    let std = std.trim().to_lowercase();
    match FlagStyle::for_family(family) {
        FlagStyle::Msvc => {
            let std_part = match std.as_str() {
                "c++11" | "c++14" => "/std:c++14",
                "c++17" => "/std:c++17",
                "c++20" => "/std:c++20",
                "c++23" | "c++26" => "/std:c++latest",
                _ => "/std:c++17",
            };
            format!("{std_part} /Zs")
        }
        FlagStyle::Gnu => format!("-std={std} -fsyntax-only"),
    }
}

/// Collapse whitespace runs and trim.
pub fn normalize_flags(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// User-supplied extra flags, global per dialect and per group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraFlags {
    pub extra_gnu: String,
    pub extra_msvc: String,
    /// Keyed `family|platform|series`
    pub by_group: BTreeMap<String, String>,
}

impl ExtraFlags {
    /// Normalize all flag text and drop empty group overrides.
    pub fn normalized(self) -> Self {
        Self {
            extra_gnu: normalize_flags(&self.extra_gnu),
            extra_msvc: normalize_flags(&self.extra_msvc),
            by_group: self
                .by_group
                .into_iter()
                .map(|(k, v)| (k, normalize_flags(&v)))
                .filter(|(_, v)| !v.is_empty())
                .collect(),
        }
    }

    pub fn for_group(&self, key: &GroupKey) -> &str {
        self.by_group
            .get(&key.to_string())
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// `userArguments` for every compiler of a group.
pub fn build_user_args(key: &GroupKey, std: &str, extra: &ExtraFlags) -> String {
    let base = std_flags_for_family(&key.family, std);
    let global = match FlagStyle::for_family(&key.family) {
        FlagStyle::Msvc => extra.extra_msvc.as_str(),
        FlagStyle::Gnu => extra.extra_gnu.as_str(),
    };
    let parts = [base.as_str(), global, extra.for_group(key)];
    normalize_flags(&parts.join(" "))
}
