use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::domain::{DomainError, DomainResult, SessionState, TelemetrySession};
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One authenticated MQTT connection, valid for the lifetime of its
/// credential.
///
/// The underlying event loop runs as a separate task handling keep-alives
/// and QoS 1 acknowledgment bookkeeping; it flips `healthy` off when the
/// transport fails so the next publish is refused instead of silently
/// queued against a dead connection.
pub struct MqttTelemetrySession {
    client: AsyncClient,
    cancel: CancellationToken,
    healthy: Arc<AtomicBool>,
    expiry_deadline: DateTime<Utc>,
    state: SessionState,
    event_task: Option<JoinHandle<()>>,
}

impl MqttTelemetrySession {
    /// Take ownership of an already-connected event loop and spawn the
    /// session's network processing task
    pub(crate) fn start(
        client: AsyncClient,
        eventloop: EventLoop,
        expiry_deadline: DateTime<Utc>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let healthy = Arc::new(AtomicBool::new(true));
        let event_task = tokio::spawn(run_session_event_loop(
            eventloop,
            cancel.clone(),
            Arc::clone(&healthy),
        ));

        Self {
            client,
            cancel,
            healthy,
            expiry_deadline,
            state: SessionState::Connected,
            event_task: Some(event_task),
        }
    }
}

#[async_trait]
impl TelemetrySession for MqttTelemetrySession {
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> DomainResult<()> {
        if self.state != SessionState::Connected || !self.healthy.load(Ordering::SeqCst) {
            return Err(DomainError::PublishFailure("connection lost".to_string()));
        }

        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| DomainError::PublishFailure(e.to_string()))
    }

    async fn close(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.state = SessionState::Closing;

        // Flush pending publishes where the transport still allows it
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "disconnect request failed, transport already gone");
        }

        self.cancel.cancel();
        if let Some(task) = self.event_task.take() {
            let _ = task.await;
        }
        self.state = SessionState::Disconnected;
    }

    fn expiry_deadline(&self) -> DateTime<Utc> {
        self.expiry_deadline
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

/// Session network processing: keep-alives, delivery acknowledgments, and
/// transport-health observation. Runs until cancelled or the transport fails.
async fn run_session_event_loop(
    mut eventloop: EventLoop,
    cancel: CancellationToken,
    healthy: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("session event loop stopped");
                break;
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    debug!(pkid = ack.pkid, "publish acknowledged");
                }
                Ok(Event::Incoming(Packet::PingResp)) => {
                    // Keep-alive response; connection is healthy
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("broker requested disconnect");
                    healthy.store(false, Ordering::SeqCst);
                    break;
                }
                Ok(_) => {
                    // Other events (outgoing, etc.)
                }
                Err(e) => {
                    warn!(error = %e, "mqtt transport error");
                    healthy.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }
}
