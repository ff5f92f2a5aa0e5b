//! check-syncrepl - OpenLDAP sync replication monitoring check
//!
//! Compares the contextCSN of a list of directory servers and reports
//! OK when they agree, CRITICAL when they differ or cannot be queried and
//! UNKNOWN when the check cannot run.
//!
//! ```text
//! check-syncrepl -h ldap1.example.com,ldap2.example.com -b dc=example,dc=com
//! check-syncrepl -h ldap1,ldap2 -b dc=example,dc=com -u cn=monitor -p secret -r 3
//! ```

mod args;

use args::Cli;
use clap::error::ErrorKind;
use clap::Parser;
use std::process::ExitCode;
use syncrepl_core::{
    CheckerConfig, ConvergenceChecker, FetchError, OutputFormat, ProbeConfig, Report,
};
use syncrepl_ldap::LdapDirectoryClient;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let text = e.to_string();
            let reason = text.lines().next().unwrap_or_default();
            let reason = reason.strip_prefix("error: ").unwrap_or(reason);
            return emit(&Report::unknown(reason), OutputFormat::Text);
        }
    };

    // Initialize logging; stdout is reserved for the status line
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => return emit(&Report::unknown(format!("{:#}", e)), cli.fallback_output()),
    };

    let report = run_check(&config).await;
    emit(&report, config.output)
}

async fn run_check(config: &ProbeConfig) -> Report {
    info!(
        "Checking contextCSN of {} for {} host(s)",
        config.base,
        config.hosts.len()
    );
    debug!(
        "Encryption: {}, verify peer: {}, retries: {}",
        config.connection.encryption, config.connection.verify_peer, config.retries
    );

    let client = match LdapDirectoryClient::new(config.connection.clone()) {
        Ok(client) => client,
        Err(e) => return setup_failure(&e),
    };

    let checker = ConvergenceChecker::new(
        client,
        CheckerConfig::from_retries(config.retries).with_retry_delay(config.retry_delay),
    );

    let verdict = checker.check(&config.hosts, &config.base).await;
    Report::from_verdict(&verdict, &config.connection)
}

/// Certificate files are read when the client is built, before any host
/// is contacted, so these are configuration problems rather than outages.
fn setup_failure(err: &FetchError) -> Report {
    match err {
        FetchError::Tls(reason) => Report::unknown(format!("Invalid TLS configuration: {}", reason)),
        other => Report::unknown(other.to_string()),
    }
}

fn emit(report: &Report, format: OutputFormat) -> ExitCode {
    match format {
        OutputFormat::Text => println!("{}", report.to_line()),
        OutputFormat::Json => match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", report.to_line()),
        },
    }

    ExitCode::from(report.exit_code())
}
