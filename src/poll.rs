//! Bounded polling for the issued certificate.
//!
//! Approval does not guarantee signing: the authority's signer controller
//! issues the certificate asynchronously. The poller reads the request at a
//! fixed interval until a certificate appears or the attempt budget runs out.
//! There is no backoff and no jitter; a read error ends the wait immediately.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::authority::{RequestStatus, SigningAuthority, SigningRequestHandle};
use crate::{Error, Result};

/// Default number of status reads before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Default time between status reads
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Fixed-count, fixed-interval polling budget
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of status reads; zero means the wait fails without reading
    pub max_attempts: u32,
    /// Sleep between consecutive reads
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollPolicy {
    /// Create a policy with the given budget
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Upper bound on the total wait (`max_attempts * interval`)
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// Waits for the authority to issue a certificate for a submitted request
pub struct ApprovalPoller<'a> {
    authority: &'a dyn SigningAuthority,
    policy: PollPolicy,
}

impl<'a> ApprovalPoller<'a> {
    /// Create a poller with an injected policy
    pub fn new(authority: &'a dyn SigningAuthority, policy: PollPolicy) -> Self {
        Self { authority, policy }
    }

    /// Poll until the request carries a certificate.
    ///
    /// Returns the PEM certificate bytes from the first read where they are
    /// non-empty. Performs at most `max_attempts` reads and sleeps only
    /// between reads.
    pub async fn wait_for_certificate(&self, handle: &SigningRequestHandle) -> Result<Vec<u8>> {
        let name = handle.name();
        let max_attempts = self.policy.max_attempts;
        let mut waited = Duration::ZERO;

        for attempt in 1..=max_attempts {
            let request = self
                .authority
                .get(name)
                .await
                .map_err(|source| Error::Polling {
                    request: name.to_string(),
                    attempt,
                    source,
                })?;

            if request.is_signed() {
                info!(csr = %name, attempt, "Certificate issued");
                return Ok(request.certificate);
            }

            if request.status == RequestStatus::Denied {
                warn!(
                    csr = %name,
                    attempt,
                    "Signing request was denied or failed; waiting out the budget"
                );
            } else {
                debug!(csr = %name, attempt, status = %request.status, "Certificate not issued yet");
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.interval).await;
                waited += self.policy.interval;
            }
        }

        warn!(
            csr = %name,
            attempts = max_attempts,
            waited_ms = waited.as_millis(),
            "Timed out waiting for certificate"
        );
        Err(Error::IssuanceTimeout {
            request: name.to_string(),
            attempts: max_attempts,
            waited,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::test_support::request;
    use crate::authority::{AuthorityError, MockSigningAuthority};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn default_policy_matches_thirty_reads_two_seconds_apart() {
        let policy = PollPolicy::default();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.budget(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn returns_immediately_when_already_signed() {
        let mut authority = MockSigningAuthority::new();
        authority
            .expect_get()
            .times(1)
            .returning(|name| Ok(request(name, RequestStatus::Signed, b"CERT")));

        let poller = ApprovalPoller::new(&authority, fast(5));
        let cert = poller
            .wait_for_certificate(&SigningRequestHandle::new("svc-a-csr"))
            .await
            .unwrap();
        assert_eq!(cert, b"CERT".to_vec());
    }

    #[tokio::test]
    async fn returns_on_first_read_with_certificate() {
        let reads = Arc::new(AtomicU32::new(0));
        let r = reads.clone();

        let mut authority = MockSigningAuthority::new();
        authority.expect_get().times(3).returning(move |name| {
            if r.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(request(name, RequestStatus::Approved, b""))
            } else {
                Ok(request(name, RequestStatus::Signed, b"CERT"))
            }
        });

        let poller = ApprovalPoller::new(&authority, fast(30));
        let cert = poller
            .wait_for_certificate(&SigningRequestHandle::new("svc-a-csr"))
            .await
            .unwrap();

        assert_eq!(cert, b"CERT".to_vec());
        assert_eq!(reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_after_exactly_max_attempts() {
        let mut authority = MockSigningAuthority::new();
        authority
            .expect_get()
            .times(7)
            .returning(|name| Ok(request(name, RequestStatus::Approved, b"")));

        let poller = ApprovalPoller::new(&authority, fast(7));
        let err = poller
            .wait_for_certificate(&SigningRequestHandle::new("svc-a-csr"))
            .await
            .unwrap_err();

        match err {
            Error::IssuanceTimeout {
                request, attempts, ..
            } => {
                assert_eq!(request, "svc-a-csr");
                assert_eq!(attempts, 7);
            }
            other => panic!("expected IssuanceTimeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_spends_the_interval_between_reads() {
        let mut authority = MockSigningAuthority::new();
        authority
            .expect_get()
            .times(30)
            .returning(|name| Ok(request(name, RequestStatus::Pending, b"")));

        let started = tokio::time::Instant::now();
        let poller = ApprovalPoller::new(&authority, PollPolicy::default());
        let err = poller
            .wait_for_certificate(&SigningRequestHandle::new("svc-a-csr"))
            .await
            .unwrap_err();

        let elapsed = started.elapsed();
        assert!(err.is_timeout());
        assert!(elapsed >= Duration::from_secs(58), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_secs(60), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn read_error_is_propagated_without_retry() {
        let mut authority = MockSigningAuthority::new();
        authority
            .expect_get()
            .times(1)
            .returning(|_| Err(AuthorityError::Unavailable("connection refused".to_string())));

        let poller = ApprovalPoller::new(&authority, fast(30));
        let err = poller
            .wait_for_certificate(&SigningRequestHandle::new("svc-a-csr"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Polling { attempt: 1, .. }));
    }

    #[tokio::test]
    async fn read_error_after_pending_reads_reports_attempt() {
        let reads = Arc::new(AtomicU32::new(0));
        let r = reads.clone();

        let mut authority = MockSigningAuthority::new();
        authority.expect_get().times(2).returning(move |name| {
            if r.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(request(name, RequestStatus::Pending, b""))
            } else {
                Err(AuthorityError::NotFound(name.to_string()))
            }
        });

        let poller = ApprovalPoller::new(&authority, fast(30));
        let err = poller
            .wait_for_certificate(&SigningRequestHandle::new("svc-a-csr"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Polling { attempt: 2, .. }));
    }

    #[tokio::test]
    async fn zero_attempts_times_out_without_reading() {
        let mut authority = MockSigningAuthority::new();
        authority.expect_get().never();

        let poller = ApprovalPoller::new(&authority, fast(0));
        let err = poller
            .wait_for_certificate(&SigningRequestHandle::new("svc-a-csr"))
            .await
            .unwrap_err();

        match err {
            Error::IssuanceTimeout {
                attempts, waited, ..
            } => {
                assert_eq!(attempts, 0);
                assert_eq!(waited, Duration::ZERO);
            }
            other => panic!("expected IssuanceTimeout, got {:?}", other),
        }
    }

    /// Story: an administrator denies the request out of band. Denial is not
    /// a distinct outcome, so the poller keeps reading until the budget is
    /// spent and reports a timeout.
    #[tokio::test]
    async fn denied_request_waits_out_the_budget() {
        let mut authority = MockSigningAuthority::new();
        authority
            .expect_get()
            .times(4)
            .returning(|name| Ok(request(name, RequestStatus::Denied, b"")));

        let poller = ApprovalPoller::new(&authority, fast(4));
        let err = poller
            .wait_for_certificate(&SigningRequestHandle::new("svc-a-csr"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::IssuanceTimeout { attempts: 4, .. }));
    }
}
