use std::fmt;

use serde::Serialize;

use crate::batch::InsertCounts;
use crate::resolver::ResolveStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportStrategy {
    /// Whole document parsed at once; small and medium corpora.
    InMemory,
    /// Array-at-a-time passes through a staging file; memory bounded by chunk size.
    Streaming,
}

impl ImportStrategy {
    pub fn select(declared_images: u64, threshold: u64) -> Self {
        if declared_images < threshold {
            ImportStrategy::InMemory
        } else {
            ImportStrategy::Streaming
        }
    }
}

impl fmt::Display for ImportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStrategy::InMemory => write!(f, "in-memory"),
            ImportStrategy::Streaming => write!(f, "streaming"),
        }
    }
}

/// What either strategy hands back to the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub images: u64,
    pub counts: InsertCounts,
    pub stats: ResolveStats,
}
