use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

use crate::error::{BackupError, Result};

/// Compiled exclusion set. Patterns are matched against the full relative
/// path of each entry; a pattern containing no separator additionally matches
/// any entry whose basename matches it, so `--exclude node_modules` prunes
/// the directory at any depth.
#[derive(Debug, Clone)]
pub struct PathFilter {
    set: GlobSet,
}

impl PathFilter {
    /// Compile `patterns` once, up front. A malformed pattern fails here,
    /// before any scanning begins.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(compile(pattern)?);
            if !pattern.contains('/') {
                builder.add(compile(&format!("**/{pattern}"))?);
            }
        }
        let set = builder
            .build()
            .map_err(|e| BackupError::Config(format!("cannot build exclude set: {e}")))?;
        Ok(Self { set })
    }

    /// No patterns, nothing excluded.
    pub fn empty() -> Self {
        Self { set: GlobSet::empty() }
    }

    pub fn is_excluded(&self, rel: &Path) -> bool {
        self.set.is_match(rel)
    }
}

fn compile(pattern: &str) -> Result<Glob> {
    Glob::new(pattern).map_err(|source| BackupError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}
