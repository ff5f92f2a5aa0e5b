//! Monitoring status for a verdict
//!
//! Follows the usual check-plugin convention: one status line on stdout and
//! the exit code 0 (OK), 1 (WARNING), 2 (CRITICAL) or 3 (UNKNOWN).

use crate::config::ConnectionConfig;
use crate::types::{DivergentPair, Host, Verdict};
use serde::Serialize;
use std::fmt;

/// Prefix of every status line
pub const CHECK_NAME: &str = "SYNCREPL";

/// Monitoring status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Status {
    pub fn exit_code(&self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::Warning => 1,
            Status::Critical => 2,
            Status::Unknown => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered outcome of a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub status: Status,
    pub code: u8,
    pub message: String,
    /// Divergent hosts, each pair sorted, pairs sorted
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub divergent_pairs: Vec<(Host, Host)>,
    /// Host that could not be queried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<Host>,
}

impl Report {
    fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            code: status.exit_code(),
            message: message.into(),
            divergent_pairs: Vec::new(),
            host: None,
        }
    }

    /// UNKNOWN report for problems found before any check ran
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Status::Unknown, message)
    }

    pub fn from_verdict(verdict: &Verdict, connection: &ConnectionConfig) -> Self {
        match verdict {
            Verdict::InSync => Self::new(Status::Ok, "All nodes are in sync"),
            Verdict::Inconclusive(reason) => Self::new(Status::Unknown, reason.clone()),
            Verdict::FetchFailed { host, cause } => {
                let mut message = format!("Cannot connect to {}:{}", host, connection.port);
                if let Some(user) = &connection.user {
                    message.push_str(&format!(" as {}", user));
                }
                message.push_str(&format!(": {}", cause));

                let mut report = Self::new(Status::Critical, message);
                report.host = Some(host.clone());
                report
            }
            Verdict::Diverged(pairs) => {
                let mut report = Self::new(Status::Critical, divergence_message(pairs));
                report.divergent_pairs = sorted_pairs(pairs);
                report
            }
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.code
    }

    /// Single monitoring status line
    pub fn to_line(&self) -> String {
        format!("{} {}: {}", CHECK_NAME, self.status, self.message)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn sorted_pairs(pairs: &[DivergentPair]) -> Vec<(Host, Host)> {
    let mut sorted: Vec<(Host, Host)> = pairs
        .iter()
        .map(|pair| {
            let (a, b) = pair.sorted();
            (a.clone(), b.clone())
        })
        .collect();
    sorted.sort();
    sorted
}

/// "ContextCSNs differ between: a and b, a and c"
pub fn divergence_message(pairs: &[DivergentPair]) -> String {
    let mut joined: Vec<String> = pairs.iter().map(ToString::to_string).collect();
    joined.sort();
    format!("ContextCSNs differ between: {}", joined.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    fn pair(a: &str, b: &str) -> DivergentPair {
        DivergentPair::new(Host::from(a), Host::from(b))
    }

    #[test]
    fn test_in_sync_is_ok() {
        let report = Report::from_verdict(&Verdict::InSync, &ConnectionConfig::default());

        assert_eq!(report.status, Status::Ok);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.to_line(), "SYNCREPL OK: All nodes are in sync");
    }

    #[test]
    fn test_inconclusive_is_unknown() {
        let verdict = Verdict::Inconclusive("need at least two hosts to compare".into());
        let report = Report::from_verdict(&verdict, &ConnectionConfig::default());

        assert_eq!(report.status, Status::Unknown);
        assert_eq!(report.exit_code(), 3);
        assert_eq!(report.message, "need at least two hosts to compare");
    }

    #[test]
    fn test_divergence_message_sorting() {
        let verdict = Verdict::Diverged(vec![pair("b", "a"), pair("c", "a")]);
        let report = Report::from_verdict(&verdict, &ConnectionConfig::default());

        assert_eq!(report.status, Status::Critical);
        assert_eq!(report.exit_code(), 2);
        assert_eq!(report.message, "ContextCSNs differ between: a and b, a and c");
        assert_eq!(
            report.divergent_pairs,
            vec![
                (Host::from("a"), Host::from("b")),
                (Host::from("a"), Host::from("c")),
            ]
        );
    }

    #[test]
    fn test_divergence_pairs_sorted_by_joined_text() {
        let message = divergence_message(&[
            pair("ldap3", "ldap2"),
            pair("ldap1", "ldap3"),
            pair("ldap2", "ldap1"),
        ]);

        assert_eq!(
            message,
            "ContextCSNs differ between: ldap1 and ldap2, ldap1 and ldap3, ldap2 and ldap3"
        );
    }

    #[test]
    fn test_fetch_failure_message() {
        let verdict = Verdict::FetchFailed {
            host: Host::from("ldap2.example.com"),
            cause: FetchError::Connect("connection refused".into()),
        };

        let report = Report::from_verdict(&verdict, &ConnectionConfig::default());
        assert_eq!(report.status, Status::Critical);
        assert_eq!(
            report.message,
            "Cannot connect to ldap2.example.com:389: connection failed: connection refused"
        );

        let connection = ConnectionConfig {
            port: 636,
            user: Some("cn=monitor,dc=example,dc=com".into()),
            password: Some("secret".into()),
            ..Default::default()
        };
        let report = Report::from_verdict(&verdict, &connection);
        assert_eq!(
            report.message,
            "Cannot connect to ldap2.example.com:636 as cn=monitor,dc=example,dc=com: \
             connection failed: connection refused"
        );
        assert!(!report.message.contains("secret"));
        assert_eq!(report.host, Some(Host::from("ldap2.example.com")));
    }

    #[test]
    fn test_json_rendering() {
        let verdict = Verdict::Diverged(vec![pair("b", "a")]);
        let report = Report::from_verdict(&verdict, &ConnectionConfig::default());

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "critical");
        assert_eq!(json["code"], 2);
        assert_eq!(json["divergent_pairs"], serde_json::json!([["a", "b"]]));
        assert!(json.get("host").is_none());
    }
}
