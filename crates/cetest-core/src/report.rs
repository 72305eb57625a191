//! Report interchange: JSON persistence and a plain-text table.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::summary::{overall_lowest, CompileAttempt, GroupStatus, GroupSummary};
use crate::Result;

const DEFAULT_STANDARD: &str = "c++17";

fn default_standard() -> String {
    DEFAULT_STANDARD.to_string()
}

/// A complete probe run as persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    #[serde(default = "default_standard")]
    pub standard: String,
    #[serde(default)]
    pub groups: Vec<GroupSummary>,
}

impl Default for ProbeReport {
    fn default() -> Self {
        Self::new(DEFAULT_STANDARD)
    }
}

impl ProbeReport {
    pub fn new(standard: impl Into<String>) -> Self {
        Self {
            standard: standard.into(),
            groups: Vec::new(),
        }
    }

    pub fn push(&mut self, summary: GroupSummary) {
        self.groups.push(summary);
    }

    pub fn overall_lowest(&self) -> Option<&CompileAttempt> {
        overall_lowest(&self.groups)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::Report(e.to_string()))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Summary table, one line per group plus the overall minimum.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "standard: {}", self.standard);
        if self.groups.is_empty() {
            out.push_str("(no groups probed)\n");
            return out;
        }
        for summary in &self.groups {
            out.push_str(&render_group_line(summary));
            out.push('\n');
        }
        match self.overall_lowest() {
            Some(a) => {
                let _ = writeln!(out, "overall lowest supported: {} [{}]", a.label(), a.family);
            }
            None => out.push_str("overall lowest supported: none\n"),
        }
        out
    }
}

/// One table line for a group result.
pub fn render_group_line(summary: &GroupSummary) -> String {
    let label = |a: &Option<CompileAttempt>| {
        a.as_ref()
            .map(CompileAttempt::label)
            .unwrap_or_else(|| "-".to_string())
    };
    let head = format!(
        "{:<12} {:<10} {:<28}",
        summary.key.family, summary.key.platform, summary.key.series
    );
    match summary.status() {
        GroupStatus::Supported => format!(
            "{head} OK    newest {} | oldest {} | first failure {} ({} tried)",
            label(&summary.highest_supported),
            label(&summary.lowest_supported),
            label(&summary.first_failure),
            summary.attempts.len()
        ),
        GroupStatus::NoSuccess => format!(
            "{head} FAIL  newest {} rejects the snippet",
            label(&summary.first_failure)
        ),
        GroupStatus::Inconclusive => format!(
            "{head} ???   {}",
            summary.inconclusive_reason.as_deref().unwrap_or("inconclusive")
        ),
    }
}
