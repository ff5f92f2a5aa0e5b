//! Core data types: hosts, CSN sets, divergent pairs and verdicts

use crate::error::FetchError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Host
// ============================================================================

/// Directory server identifier (hostname or address)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Host(String);

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a comma separated host list, trimming blanks and dropping
    /// empty entries. Duplicates are kept; the checker collapses them.
    pub fn parse_list(list: &str) -> Vec<Host> {
        list.split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(Host::new)
            .collect()
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Host {
    fn from(s: &str) -> Self {
        Host::new(s)
    }
}

// ============================================================================
// CSN set
// ============================================================================

/// The contextCSN values one host reports for a naming context.
///
/// A server publishes one CSN per replication contributor (server id), so
/// this is a set rather than a single value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsnSet(BTreeSet<String>);

impl CsnSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// CSNs present here but missing from `other`
    pub fn missing_from<'a>(&'a self, other: &'a CsnSet) -> impl Iterator<Item = &'a str> {
        self.0.difference(&other.0).map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for CsnSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Divergent pair
// ============================================================================

/// Two hosts whose CSN sets disagree, in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivergentPair {
    pub first: Host,
    pub second: Host,
}

impl DivergentPair {
    pub fn new(first: Host, second: Host) -> Self {
        Self { first, second }
    }

    /// Both hosts in lexicographic order
    pub fn sorted(&self) -> (&Host, &Host) {
        if self.first <= self.second {
            (&self.first, &self.second)
        } else {
            (&self.second, &self.first)
        }
    }
}

impl fmt::Display for DivergentPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b) = self.sorted();
        write!(f, "{} and {}", a, b)
    }
}

// ============================================================================
// Verdict
// ============================================================================

/// Terminal outcome of one check run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every host reported the same CSNs in some round
    InSync,
    /// Every round diverged; pairs of the final round
    Diverged(Vec<DivergentPair>),
    /// The check could not be performed
    Inconclusive(String),
    /// A host could not be queried; the run was aborted
    FetchFailed { host: Host, cause: FetchError },
}
