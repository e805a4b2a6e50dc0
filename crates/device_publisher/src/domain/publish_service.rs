use chrono::Utc;
use common::auth::{SignedToken, TokenProvider};
use common::domain::{
    collect_readings, DeviceIdentity, DomainError, DomainResult, Envelope, SensorProvider,
    SessionOpener, TelemetrySession,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::PublishServiceConfig;

/// Why the Active publish loop stopped
enum ActiveExit {
    /// Credential nearing expiry; renew proactively
    Renewal,
    /// Transport-level publish fault; the connection is presumed unhealthy
    PublishFailed,
    /// Process shutdown requested
    Shutdown,
}

/// Outcome of the bounded connect phase
enum ConnectOutcome {
    Opened(Box<dyn TelemetrySession>),
    /// Broker rejected the credential; re-issue immediately, no backoff
    AuthRejected,
    Cancelled,
}

/// Drives the renew-session-forever loop and the inner sample-encode-publish
/// cycle for one device.
///
/// Failure classification:
/// - credential issuance faults are fatal (no credential, no progress)
/// - connect faults retry with a bounded backoff, then become fatal
/// - a rejected credential skips the backoff and goes straight back to
///   issuance
/// - sensor faults skip one cycle's publish and keep the session
/// - publish faults recycle the session through a full renewal
pub struct PublishService {
    identity: DeviceIdentity,
    token_provider: Arc<dyn TokenProvider>,
    session_opener: Arc<dyn SessionOpener>,
    sensor_provider: Arc<dyn SensorProvider>,
    config: PublishServiceConfig,
}

impl PublishService {
    pub fn new(
        identity: DeviceIdentity,
        token_provider: Arc<dyn TokenProvider>,
        session_opener: Arc<dyn SessionOpener>,
        sensor_provider: Arc<dyn SensorProvider>,
        config: PublishServiceConfig,
    ) -> Self {
        Self {
            identity,
            token_provider,
            session_opener,
            sensor_provider,
            config,
        }
    }

    /// Run until shutdown. Returns an error only for fatal conditions:
    /// credential issuance failures and exhausted connect attempts.
    #[instrument(name = "publish_loop", skip_all, fields(device_scope = %self.identity.device_scope()))]
    pub async fn run(&self, shutdown: CancellationToken) -> DomainResult<()> {
        let topic = self.identity.event_topic();
        let mut auth_rejections: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                info!("shutdown requested, stopping publish loop");
                return Ok(());
            }

            // Authenticating
            let token = match self.token_provider.issue_token(Utc::now()) {
                Ok(token) => token,
                Err(e) => {
                    error!(error = %e, "credential issuance failed");
                    return Err(e);
                }
            };
            debug!(audience = %token.audience, expires_at = %token.expires_at, "issued credential");

            // Connecting
            let mut session = match self.connect(&token, &mut auth_rejections, &shutdown).await? {
                ConnectOutcome::Opened(session) => session,
                ConnectOutcome::AuthRejected => continue,
                ConnectOutcome::Cancelled => return Ok(()),
            };
            info!(expiry_deadline = %session.expiry_deadline(), "session established");

            // Active
            let exit = self.run_active(&mut *session, &topic, &shutdown).await;

            // Closing: exactly one close per session, on every exit path
            session.close().await;

            match exit {
                Ok(ActiveExit::Renewal) => debug!("renewing credential before expiry"),
                Ok(ActiveExit::PublishFailed) => warn!("recycling session after publish failure"),
                Ok(ActiveExit::Shutdown) => {
                    info!("shutdown requested, session closed");
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "fatal error in publish cycle");
                    return Err(e);
                }
            }
        }
    }

    /// Bounded connect: network faults retry with a fixed delay until the
    /// attempt ceiling; a rejected credential returns to issuance without
    /// waiting, with consecutive rejections counted against the same ceiling.
    async fn connect(
        &self,
        token: &SignedToken,
        auth_rejections: &mut u32,
        shutdown: &CancellationToken,
    ) -> DomainResult<ConnectOutcome> {
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return Ok(ConnectOutcome::Cancelled);
            }

            match self.session_opener.open(token).await {
                Ok(session) => {
                    *auth_rejections = 0;
                    return Ok(ConnectOutcome::Opened(session));
                }
                Err(DomainError::AuthRejected(reason)) => {
                    *auth_rejections += 1;
                    if *auth_rejections >= self.config.max_connect_attempts {
                        error!(
                            rejections = *auth_rejections,
                            reason = %reason,
                            "credential rejected repeatedly, giving up"
                        );
                        return Err(DomainError::AuthRejected(reason));
                    }
                    // Waiting will not make a rejected credential valid
                    warn!(reason = %reason, "credential rejected, re-issuing immediately");
                    return Ok(ConnectOutcome::AuthRejected);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.max_connect_attempts {
                        error!(attempts = attempt, error = %e, "connect attempts exhausted");
                        return Err(e);
                    }
                    warn!(
                        attempt,
                        max_attempts = self.config.max_connect_attempts,
                        error = %e,
                        "connect failed, retrying"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(ConnectOutcome::Cancelled),
                        _ = tokio::time::sleep(self.config.connect_retry_delay()) => {}
                    }
                }
            }
        }
    }

    /// One session's sample-encode-publish cycle, until the expiry deadline,
    /// a publish fault, or shutdown.
    async fn run_active(
        &self,
        session: &mut dyn TelemetrySession,
        topic: &str,
        shutdown: &CancellationToken,
    ) -> DomainResult<ActiveExit> {
        let device_scope = self.identity.device_scope();

        loop {
            if shutdown.is_cancelled() {
                return Ok(ActiveExit::Shutdown);
            }

            // Evaluated every iteration, regardless of interval size; renewal
            // is proactive, never a reaction to a broker rejection.
            if Utc::now() >= session.expiry_deadline() {
                return Ok(ActiveExit::Renewal);
            }

            match collect_readings(self.sensor_provider.as_ref()) {
                Ok(readings) => {
                    let envelope =
                        Envelope::new(Some(device_scope.clone()), &readings, Utc::now());
                    let payload = envelope.encode()?;
                    match session.publish(topic, &payload).await {
                        Ok(()) => {
                            info!(
                                envelope_id = %envelope.id,
                                readings = envelope.data.len(),
                                "published envelope"
                            );
                        }
                        Err(e) => {
                            warn!(error = %e, "publish failed");
                            return Ok(ActiveExit::PublishFailed);
                        }
                    }
                }
                Err(e) => {
                    // A sensor fault must not tear down the session
                    warn!(error = %e, "sensor collection failed, skipping cycle");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(ActiveExit::Shutdown),
                _ = tokio::time::sleep(self.config.publish_interval()) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration};
    use common::auth::MockTokenProvider;
    use common::domain::{MockSensorProvider, MockSessionOpener, MockTelemetrySession};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn test_identity() -> DeviceIdentity {
        DeviceIdentity::new("project-a", "registry-A", "device-7").unwrap()
    }

    fn test_token(now: DateTime<Utc>) -> SignedToken {
        SignedToken {
            issued_at: now,
            expires_at: now + ChronoDuration::minutes(60),
            audience: "project-a".to_string(),
            jwt: "header.claims.signature".to_string(),
        }
    }

    fn fast_config() -> PublishServiceConfig {
        PublishServiceConfig {
            publish_interval_secs: 0,
            connect_retry_delay_secs: 0,
            max_connect_attempts: 3,
        }
    }

    fn empty_sensors() -> MockSensorProvider {
        let mut sensors = MockSensorProvider::new();
        sensors.expect_enumerate_sensors().returning(|| Ok(vec![]));
        sensors
    }

    fn service(
        token_provider: MockTokenProvider,
        opener: MockSessionOpener,
        sensors: MockSensorProvider,
        config: PublishServiceConfig,
    ) -> PublishService {
        PublishService::new(
            test_identity(),
            Arc::new(token_provider),
            Arc::new(opener),
            Arc::new(sensors),
            config,
        )
    }

    #[tokio::test]
    async fn test_issuance_failure_is_fatal() {
        let mut token_provider = MockTokenProvider::new();
        token_provider
            .expect_issue_token()
            .times(1)
            .returning(|_| Err(DomainError::KeyUnavailable("missing key".to_string())));

        let svc = service(
            token_provider,
            MockSessionOpener::new(),
            MockSensorProvider::new(),
            fast_config(),
        );

        let result = svc.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(DomainError::KeyUnavailable(_))));
    }

    #[tokio::test]
    async fn test_connect_retries_are_bounded() {
        let mut token_provider = MockTokenProvider::new();
        token_provider
            .expect_issue_token()
            .times(1)
            .returning(|now| Ok(test_token(now)));

        let mut opener = MockSessionOpener::new();
        opener
            .expect_open()
            .times(3)
            .returning(|_| Err(DomainError::ConnectFailure("unreachable".to_string())));

        let svc = service(token_provider, opener, MockSensorProvider::new(), fast_config());

        let result = svc.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(DomainError::ConnectFailure(_))));
    }

    #[tokio::test]
    async fn test_publish_failure_closes_once_then_renews() {
        let shutdown = CancellationToken::new();

        let mut token_provider = MockTokenProvider::new();
        token_provider
            .expect_issue_token()
            .times(2)
            .returning(|now| Ok(test_token(now)));

        let opens = Arc::new(AtomicU32::new(0));
        let mut opener = MockSessionOpener::new();
        let shutdown_for_open = shutdown.clone();
        opener.expect_open().times(2).returning(move |_| {
            let deadline = Utc::now() + ChronoDuration::minutes(59);
            let mut session = MockTelemetrySession::new();
            session.expect_expiry_deadline().return_const(deadline);
            if opens.fetch_add(1, Ordering::SeqCst) == 0 {
                // First session: one failing publish, then exactly one close
                session
                    .expect_publish()
                    .times(1)
                    .returning(|_, _| Err(DomainError::PublishFailure("broken pipe".to_string())));
                session.expect_close().times(1).returning(|| ());
            } else {
                // Renewed session publishes, then we stop the loop
                let sd = shutdown_for_open.clone();
                session.expect_publish().times(1).returning(move |_, _| {
                    sd.cancel();
                    Ok(())
                });
                session.expect_close().times(1).returning(|| ());
            }
            Ok(Box::new(session) as Box<dyn TelemetrySession>)
        });

        let svc = service(token_provider, opener, empty_sensors(), fast_config());

        let result = svc.run(shutdown).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_no_publish_at_or_after_expiry_deadline() {
        let shutdown = CancellationToken::new();

        let issues = Arc::new(AtomicU32::new(0));
        let mut token_provider = MockTokenProvider::new();
        let shutdown_for_issue = shutdown.clone();
        token_provider
            .expect_issue_token()
            .times(2)
            .returning(move |now| {
                if issues.fetch_add(1, Ordering::SeqCst) == 1 {
                    // Stop before the second connect
                    shutdown_for_issue.cancel();
                }
                Ok(test_token(now))
            });

        let mut opener = MockSessionOpener::new();
        opener.expect_open().times(1).returning(|_| {
            let mut session = MockTelemetrySession::new();
            // Deadline already passed: the Active loop must renew without
            // a single publish attempt
            session
                .expect_expiry_deadline()
                .return_const(Utc::now() - ChronoDuration::seconds(1));
            session.expect_close().times(1).returning(|| ());
            Ok(Box::new(session) as Box<dyn TelemetrySession>)
        });

        let svc = service(token_provider, opener, empty_sensors(), fast_config());

        let result = svc.run(shutdown).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_sensor_failure_skips_cycle_and_keeps_session() {
        let shutdown = CancellationToken::new();

        let mut token_provider = MockTokenProvider::new();
        token_provider
            .expect_issue_token()
            .times(1)
            .returning(|now| Ok(test_token(now)));

        let mut opener = MockSessionOpener::new();
        opener.expect_open().times(1).returning(|_| {
            let mut session = MockTelemetrySession::new();
            session
                .expect_expiry_deadline()
                .return_const(Utc::now() + ChronoDuration::minutes(59));
            // No expect_publish: any publish on a failed cycle panics
            session.expect_close().times(1).returning(|| ());
            Ok(Box::new(session) as Box<dyn TelemetrySession>)
        });

        let cycles = Arc::new(AtomicU32::new(0));
        let shutdown_for_sensors = shutdown.clone();
        let mut sensors = MockSensorProvider::new();
        sensors.expect_enumerate_sensors().times(2).returning(move || {
            if cycles.fetch_add(1, Ordering::SeqCst) == 1 {
                shutdown_for_sensors.cancel();
            }
            Err(DomainError::SensorReadFailure("bus fault".to_string()))
        });

        let svc = service(token_provider, opener, sensors, fast_config());

        let result = svc.run(shutdown).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_auth_rejection_reissues_without_backoff() {
        let shutdown = CancellationToken::new();

        let mut token_provider = MockTokenProvider::new();
        token_provider
            .expect_issue_token()
            .times(2)
            .returning(|now| Ok(test_token(now)));

        let opens = Arc::new(AtomicU32::new(0));
        let mut opener = MockSessionOpener::new();
        let shutdown_for_open = shutdown.clone();
        opener.expect_open().times(2).returning(move |_| {
            if opens.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(DomainError::AuthRejected("expired credential".to_string()));
            }
            let mut session = MockTelemetrySession::new();
            session
                .expect_expiry_deadline()
                .return_const(Utc::now() - ChronoDuration::seconds(1));
            let sd = shutdown_for_open.clone();
            session.expect_close().times(1).returning(move || sd.cancel());
            Ok(Box::new(session) as Box<dyn TelemetrySession>)
        });

        // A one-hour retry delay proves the rejection path never sleeps
        let config = PublishServiceConfig {
            publish_interval_secs: 0,
            connect_retry_delay_secs: 3600,
            max_connect_attempts: 3,
        };
        let svc = service(token_provider, opener, empty_sensors(), config);

        let result = tokio::time::timeout(Duration::from_secs(5), svc.run(shutdown)).await;
        assert!(result.expect("re-issuance must not wait out the backoff").is_ok());
    }

    #[tokio::test]
    async fn test_repeated_auth_rejections_escalate_to_fatal() {
        let mut token_provider = MockTokenProvider::new();
        token_provider
            .expect_issue_token()
            .times(3)
            .returning(|now| Ok(test_token(now)));

        let mut opener = MockSessionOpener::new();
        opener
            .expect_open()
            .times(3)
            .returning(|_| Err(DomainError::AuthRejected("bad audience".to_string())));

        let svc = service(token_provider, opener, MockSensorProvider::new(), fast_config());

        let result = svc.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(DomainError::AuthRejected(_))));
    }

    #[tokio::test]
    async fn test_already_cancelled_exits_before_issuance() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let svc = service(
            MockTokenProvider::new(),
            MockSessionOpener::new(),
            MockSensorProvider::new(),
            fast_config(),
        );

        let result = svc.run(shutdown).await;
        assert!(result.is_ok());
    }
}
