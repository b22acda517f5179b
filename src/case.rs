//! Benchmark case definitions and selection
//!
//! Cases are authored in a JSON file and referenced by id everywhere else in
//! the pipeline. A case names the workload entry point handed to the
//! compiler-under-test plus any extra arguments; tags support filtered runs.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single named benchmark workload
///
/// Immutable; defined by benchmark authors and referenced by `id` in samples,
/// history records, and verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkCase {
    /// Identifier, unique within the cases file
    pub id: String,
    /// Suite the case belongs to (e.g., "compile", "runtime")
    pub suite: String,
    /// Human-oriented description, used for debugging output only
    #[serde(default)]
    pub description: String,
    /// Tags for filtering and search
    #[serde(default)]
    pub tags: Vec<String>,
    /// Path of the workload handed to the compiler-under-test
    pub entry: PathBuf,
    /// Extra arguments appended to the benchmark invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Produced artifact to size after a successful invocation, if any
    #[serde(default)]
    pub artifact: Option<PathBuf>,
}

/// Errors loading or validating a cases file
#[derive(Debug, Error)]
pub enum CaseFileError {
    #[error("failed to read cases file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse cases file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate case id `{0}` in cases file")]
    DuplicateId(String),

    #[error("invalid tag filter `{pattern}`: {source}")]
    TagFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// The full set of registered cases for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSet {
    pub cases: Vec<BenchmarkCase>,
}

impl CaseSet {
    /// Load cases from a JSON file, rejecting duplicate ids
    pub fn load(path: &Path) -> Result<Self, CaseFileError> {
        let data = fs::read_to_string(path).map_err(|source| CaseFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let set: CaseSet = serde_json::from_str(&data).map_err(|source| CaseFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut seen = HashSet::new();
        for case in &set.cases {
            if !seen.insert(case.id.clone()) {
                return Err(CaseFileError::DuplicateId(case.id.clone()));
            }
        }

        Ok(set)
    }

    /// Cases matching an optional requested-id subset, in file order
    ///
    /// `None` selects all registered cases. Requested ids with no registered
    /// case are ignored by the selection; the caller decides whether to warn.
    pub fn select(&self, requested: Option<&BTreeSet<String>>) -> Vec<BenchmarkCase> {
        match requested {
            None => self.cases.clone(),
            Some(ids) => self
                .cases
                .iter()
                .filter(|case| ids.contains(&case.id))
                .cloned()
                .collect(),
        }
    }

    /// Cases whose id or any tag matches the given regex
    pub fn filter(&self, pattern: &str) -> Result<Vec<BenchmarkCase>, CaseFileError> {
        let re = Regex::new(pattern).map_err(|source| CaseFileError::TagFilter {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(self
            .cases
            .iter()
            .filter(|case| re.is_match(&case.id) || case.tags.iter().any(|t| re.is_match(t)))
            .cloned()
            .collect())
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }
}
