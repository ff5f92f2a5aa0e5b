//! Convergence checker
//!
//! Runs up to `max_attempts` rounds. Each round fetches the CSN set of
//! every host in configuration order and compares every pair of hosts.
//! The first round without a divergent pair ends the run as in sync; a
//! fetch failure ends it immediately. When every round diverges, the
//! pairs of the last round are reported.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::types::{CsnSet, DivergentPair, Host, Verdict};

/// Source of contextCSN values for a host
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Fetch the CSN set `host` publishes for the naming context `base`
    async fn fetch_csns(&self, host: &Host, base: &str) -> Result<CsnSet, FetchError>;
}

#[async_trait]
impl<T: DirectoryClient + ?Sized> DirectoryClient for &T {
    async fn fetch_csns(&self, host: &Host, base: &str) -> Result<CsnSet, FetchError> {
        (**self).fetch_csns(host, base).await
    }
}

/// Retry policy of the checker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    /// Total number of rounds, always at least one
    pub max_attempts: u32,
    /// Pause between a diverged round and the next one
    pub retry_delay: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }
}

impl CheckerConfig {
    /// `retries` extra rounds after the first
    pub fn from_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Default::default()
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Result of a single round
enum Round {
    Converged,
    Diverged(Vec<DivergentPair>),
    Failed { host: Host, cause: FetchError },
}

/// Compares the replication state of a set of directory servers
pub struct ConvergenceChecker<C> {
    client: C,
    config: CheckerConfig,
}

impl<C: DirectoryClient> ConvergenceChecker<C> {
    pub fn new(client: C, config: CheckerConfig) -> Self {
        Self { client, config }
    }

    /// Run the check against `hosts` for the naming context `base`
    pub async fn check(&self, hosts: &[Host], base: &str) -> Verdict {
        if hosts.len() < 2 {
            return Verdict::Inconclusive("need at least two hosts to compare".to_string());
        }

        // A host listed twice is fetched once and never paired with itself
        let hosts = dedup_hosts(hosts);

        let max_attempts = self.config.max_attempts.max(1);
        let mut last_pairs = Vec::new();

        for attempt in 1..=max_attempts {
            match self.round(&hosts, base).await {
                Round::Converged => {
                    info!(attempt, hosts = hosts.len(), "All nodes are in sync");
                    return Verdict::InSync;
                }
                Round::Failed { host, cause } => {
                    warn!(attempt, %host, kind = cause.kind(), error = %cause, "Failed to fetch contextCSN");
                    return Verdict::FetchFailed { host, cause };
                }
                Round::Diverged(pairs) => {
                    warn!(
                        attempt,
                        max_attempts,
                        divergent = pairs.len(),
                        "ContextCSNs differ"
                    );
                    last_pairs = pairs;
                }
            }

            if attempt < max_attempts && !self.config.retry_delay.is_zero() {
                debug!(delay = ?self.config.retry_delay, "Waiting before next round");
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Verdict::Diverged(last_pairs)
    }

    async fn round(&self, hosts: &[Host], base: &str) -> Round {
        let mut csns = Vec::with_capacity(hosts.len());

        for host in hosts {
            debug!(%host, base, "Fetching contextCSN");
            match self.client.fetch_csns(host, base).await {
                Ok(set) if set.is_empty() => {
                    return Round::Failed {
                        host: host.clone(),
                        cause: FetchError::EmptyCsnSet(base.to_string()),
                    };
                }
                Ok(set) => {
                    debug!(%host, count = set.len(), "Fetched contextCSN");
                    csns.push((host, set));
                }
                Err(cause) => {
                    return Round::Failed {
                        host: host.clone(),
                        cause,
                    };
                }
            }
        }

        let pairs = divergent_pairs(&csns);
        if pairs.is_empty() {
            Round::Converged
        } else {
            Round::Diverged(pairs)
        }
    }
}

/// Compare every pair `(csns[i], csns[j])` with `i < j`.
///
/// NOTE: this is a one-directional test. A pair diverges when the earlier
/// host holds a CSN the later host lacks; a later host that is merely
/// *ahead* of an earlier one is not flagged. `[a, b]` and `[b, a]` can
/// therefore disagree. Kept this way to match the long-standing behaviour
/// of the check; switching to set equality changes which pairs alert.
fn divergent_pairs(csns: &[(&Host, CsnSet)]) -> Vec<DivergentPair> {
    let mut pairs = Vec::new();

    for (i, (first, first_set)) in csns.iter().enumerate() {
        for (second, second_set) in &csns[i + 1..] {
            if let Some(csn) = first_set.missing_from(second_set).next() {
                debug!(%first, %second, csn, "CSN missing on peer");
                pairs.push(DivergentPair::new((*first).clone(), (*second).clone()));
            }
        }
    }

    pairs
}

/// Drop repeated hosts, keeping the first occurrence
fn dedup_hosts(hosts: &[Host]) -> Vec<Host> {
    let mut seen = HashSet::with_capacity(hosts.len());
    hosts
        .iter()
        .filter(|host| seen.insert(*host))
        .cloned()
        .collect()
}
