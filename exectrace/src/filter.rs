use serde::{Deserialize, Serialize};

use crate::events::ExecEvent;

/// Events excluded from the output, matched against the resolved
/// executable path
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Filter {
    pub exclude_prefixes: Vec<String>,
    pub exclude_suffixes: Vec<String>,
    pub exclude_infixes: Vec<String>,
    /// drop events missing a mandatory field or having failed stages
    pub drop_incomplete: bool,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.exclude_prefixes.is_empty()
            && self.exclude_suffixes.is_empty()
            && self.exclude_infixes.is_empty()
            && !self.drop_incomplete
    }

    pub fn excludes_path(&self, path: &str) -> bool {
        self.exclude_prefixes.iter().any(|p| path.starts_with(p.as_str()))
            || self.exclude_suffixes.iter().any(|s| path.ends_with(s.as_str()))
            || self.exclude_infixes.iter().any(|i| path.contains(i.as_str()))
    }

    /// Returns true if the event must be kept
    pub fn keep(&self, e: &ExecEvent) -> bool {
        if self.drop_incomplete && !e.complete {
            return false;
        }
        !self.excludes_path(&e.resolved_path)
    }
}
