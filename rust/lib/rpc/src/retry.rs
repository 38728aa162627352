//! Startup connection with retry and operator notification.
//!
//! The bridge cannot start without the remote server: a failed connection is
//! retried a fixed number of times, then reported to the operator through a
//! [`Notifier`] before the error is returned to abort startup.

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::RpcError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Wait between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Where the bridge was trying to connect, for the failure report.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub url: String,
    pub db: String,
    pub user: String,
}

/// Sent to the operator once every attempt has failed.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub subject: String,
    pub connection: ConnectionInfo,
    pub attempts: u32,
    pub delay_secs: u64,
    pub last_error: String,
}

impl FailureReport {
    /// Plain-text body suitable for mail or chat.
    pub fn body(&self) -> String {
        format!(
            "Unable to connect to a running Odoo server; the application did not start.\n\
             Tried {} times, waiting {} seconds between attempts.\n\
             \n\
             USER: {}\n\
             URL: {}\n\
             DB: {}\n\
             \n\
             Last error: {}\n",
            self.attempts,
            self.delay_secs,
            self.connection.user,
            self.connection.url,
            self.connection.db,
            self.last_error,
        )
    }
}

/// Delivers failure reports to an operator.
pub trait Notifier: Send + Sync {
    fn notify(&self, report: &FailureReport) -> Result<(), RpcError>;
}

/// Reports through the log only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, report: &FailureReport) -> Result<(), RpcError> {
        error!(subject = %report.subject, "{}", report.body());
        Ok(())
    }
}

/// POSTs the report as JSON to an HTTP endpoint.
pub struct WebhookNotifier {
    http: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            url: url.into(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, report: &FailureReport) -> Result<(), RpcError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({
                "subject": report.subject,
                "text": report.body(),
                "report": report,
            }))
            .send()?;
        if !resp.status().is_success() {
            let code = i64::from(resp.status().as_u16());
            let message = resp.text().unwrap_or_default();
            return Err(RpcError::Server { code, message });
        }
        Ok(())
    }
}

/// Run `connect` until it succeeds or the policy is exhausted.
///
/// On exhaustion the failure is reported through `notifier` (a failing
/// notifier is logged, not returned) and the last connection error is
/// returned.
pub fn connect_with_retry<T, F>(
    policy: &RetryPolicy,
    info: &ConnectionInfo,
    notifier: &dyn Notifier,
    mut connect: F,
) -> Result<T, RpcError>
where
    F: FnMut() -> Result<T, RpcError>,
{
    let total = policy.max_retries + 1;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match connect() {
            Ok(client) => {
                info!(url = %info.url, db = %info.db, attempt, "connected to odoo");
                return Ok(client);
            }
            Err(e) if attempt < total => {
                warn!(
                    url = %info.url,
                    error = %e,
                    "failed to connect to a running Odoo server, {} trials left, waiting {:?}",
                    total - attempt,
                    policy.delay,
                );
                std::thread::sleep(policy.delay);
            }
            Err(e) => {
                error!(url = %info.url, error = %e, "unable to connect to a running Odoo server, aborting");
                let report = FailureReport {
                    subject: "APPLICATION FAILURE - odoo-mirror".to_string(),
                    connection: info.clone(),
                    attempts: total,
                    delay_secs: policy.delay.as_secs(),
                    last_error: e.to_string(),
                };
                if let Err(notify_err) = notifier.notify(&report) {
                    error!(error = %notify_err, "failed to notify operator");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<FailureReport>>);

    impl Notifier for Recording {
        fn notify(&self, report: &FailureReport) -> Result<(), RpcError> {
            self.0.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    fn info() -> ConnectionInfo {
        ConnectionInfo {
            url: "http://localhost:8069".into(),
            db: "prod".into(),
            user: "admin".into(),
        }
    }

    fn quick(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let notifier = Recording::default();
        let mut calls = 0;
        let result = connect_with_retry(&quick(3), &info(), &notifier, || {
            calls += 1;
            if calls < 3 {
                Err(RpcError::Auth("down".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert!(notifier.0.lock().unwrap().is_empty());
    }

    #[test]
    fn exhausting_retries_notifies_and_returns_last_error() {
        let notifier = Recording::default();
        let mut calls = 0;
        let result: Result<(), _> = connect_with_retry(&quick(2), &info(), &notifier, || {
            calls += 1;
            Err(RpcError::Auth(format!("attempt {calls}")))
        });

        assert_eq!(calls, 3);
        match result {
            Err(RpcError::Auth(msg)) => assert_eq!(msg, "attempt 3"),
            other => panic!("unexpected: {other:?}"),
        }
        let reports = notifier.0.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].attempts, 3);
        assert!(reports[0].body().contains("DB: prod"));
        assert!(reports[0].last_error.contains("attempt 3"));
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        let mut calls = 0;
        let result: Result<(), _> = connect_with_retry(&quick(0), &info(), &LogNotifier, || {
            calls += 1;
            Err(RpcError::Decode("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
