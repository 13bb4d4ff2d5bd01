//! Replace-style publishing with a bounded retry budget.
//!
//! Publishing is two steps against a [`PublishTarget`]:
//! 1. best-effort delete of whatever lives at the remote path (never retried, failures
//!    such as "not found" are only logged);
//! 2. upload of the local content, retried up to `max_attempts` times with the delay
//!    given by a [`BackoffStrategy`].
//!
//! The two steps are not atomic. If the process dies after the delete and before an
//! upload succeeds, the remote artifact is simply absent until the next run.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::contract::{AttemptOutcome, ProgressSink, PublishTarget};
use crate::error::PublishError;
use crate::retry::{BackoffStrategy, LinearBackoff, Sleeper, TokioSleeper};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Successful publish and the number of upload attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub remote_name: String,
    pub attempts: u32,
}

pub struct RetryingPublisher {
    target: Arc<dyn PublishTarget>,
    sink: Arc<dyn ProgressSink>,
    backoff: Arc<dyn BackoffStrategy>,
    sleeper: Arc<dyn Sleeper>,
    max_attempts: u32,
}

impl RetryingPublisher {
    /// Publisher with linear 30s backoff, tokio sleeps and 5 attempts.
    pub fn new(target: Arc<dyn PublishTarget>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            target,
            sink,
            backoff: Arc::new(LinearBackoff::default()),
            sleeper: Arc::new(TokioSleeper),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// A budget of 0 is treated as 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn publish(
        &self,
        local_path: &Path,
        remote_name: &str,
        destination: &str,
    ) -> Result<PublishOutcome, PublishError> {
        match self.target.delete_existing(destination, remote_name).await {
            Ok(()) => info!(remote_name, destination, "[PUBLISH] Deleted previous remote version"),
            Err(e) => info!(
                remote_name,
                destination,
                error = %e,
                "[PUBLISH] No previous remote version removed"
            ),
        }

        let mut attempt = 0;
        loop {
            info!(
                remote_name,
                attempt = attempt + 1,
                max_attempts = self.max_attempts,
                "[PUBLISH] Uploading"
            );
            match self.target.upload(local_path, destination, remote_name).await {
                Ok(()) => {
                    self.sink
                        .on_attempt(remote_name, attempt + 1, &AttemptOutcome::Succeeded);
                    info!(remote_name, attempts = attempt + 1, "[PUBLISH] Published");
                    return Ok(PublishOutcome {
                        remote_name: remote_name.to_string(),
                        attempts: attempt + 1,
                    });
                }
                Err(e) => {
                    let last = attempt + 1 >= self.max_attempts;
                    let retry_in = (!last).then(|| self.backoff.delay(attempt));
                    self.sink.on_attempt(
                        remote_name,
                        attempt + 1,
                        &AttemptOutcome::Failed {
                            error: e.to_string(),
                            retry_in,
                        },
                    );
                    match retry_in {
                        Some(delay) => {
                            warn!(
                                remote_name,
                                attempt = attempt + 1,
                                error = %e,
                                retry_in_secs = delay.as_secs_f64(),
                                "[PUBLISH] Upload failed, retrying"
                            );
                            self.sleeper.sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            error!(
                                remote_name,
                                attempts = attempt + 1,
                                error = %e,
                                "[PUBLISH][ERROR] Retry budget exhausted"
                            );
                            return Err(PublishError {
                                remote_name: remote_name.to_string(),
                                attempts: attempt + 1,
                                last_error: e,
                            });
                        }
                    }
                }
            }
        }
    }
}
