//! Event stream connection and reconnect loop

use bytes::Bytes;
use futures::{Stream, StreamExt};
use oh_config::ClientConfig;
use oh_core::{decode, Event, RawEvent, SharedTelemetry, SystemEvent};
use oh_event_bus::SharedEventBus;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backoff::ReconnectState;
use crate::error::{StreamError, StreamResult};
use crate::frame::{Frame, FrameParser, LineBuffer};

const EVENTS_PATH: &str = "/rest/events";

/// Reads the server event stream and publishes decoded events
///
/// Every decoded event goes to the internal bus first, then to the user bus.
pub struct StreamIngester {
    http: reqwest::Client,
    url: String,
    topics: Option<String>,
    api_token: Option<String>,
    credentials: Option<(String, Option<String>)>,
    internal: SharedEventBus,
    user: SharedEventBus,
    telemetry: SharedTelemetry,
    reconnect: Arc<ReconnectState>,
}

impl StreamIngester {
    pub fn new(
        config: &ClientConfig,
        internal: SharedEventBus,
        user: SharedEventBus,
        telemetry: SharedTelemetry,
    ) -> StreamResult<Self> {
        // No overall timeout: the stream stays open indefinitely
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(StreamError::Client)?;

        Ok(Self {
            http,
            url: format!("{}{}", config.base_url(), EVENTS_PATH),
            topics: config.event_topics.clone(),
            api_token: config.api_token.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
            internal,
            user,
            telemetry,
            reconnect: ReconnectState::new(config.backoff.clone()),
        })
    }

    /// Shared reconnect state, exposed for inspection
    pub fn reconnect_state(&self) -> &Arc<ReconnectState> {
        &self.reconnect
    }

    /// Connect, consume and reconnect until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(url = %self.url, "Starting event stream");

        while !shutdown.is_cancelled() {
            match self.connect().await {
                Ok(response) => {
                    info!(url = %self.url, "Event stream connected");
                    self.publish_both(SystemEvent::Connected.into());
                    self.arm_stability_timer();

                    let result = tokio::select! {
                        _ = shutdown.cancelled() => {
                            self.reconnect.cancel_stability_timer();
                            self.publish_both(SystemEvent::Disconnected.into());
                            break;
                        }
                        result = self.consume(response.bytes_stream()) => {
                            result.map_err(StreamError::Read)
                        }
                    };
                    self.reconnect.cancel_stability_timer();

                    let message = match result {
                        Ok(()) => "event stream closed by server".to_string(),
                        Err(e) => e.to_string(),
                    };
                    warn!(%message, "Event stream disconnected");
                    self.internal
                        .publish(SystemEvent::Error { message }.into());
                    self.publish_both(SystemEvent::Disconnected.into());
                }
                Err(e) => {
                    warn!(error = %e, "Event stream connection failed");
                    self.internal.publish(
                        SystemEvent::Error {
                            message: e.to_string(),
                        }
                        .into(),
                    );
                }
            }

            let delay = self.reconnect.next_delay();
            self.telemetry.reconnect_scheduled(delay);
            info!(?delay, "Reconnecting to event stream");

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Event stream stopped");
    }

    async fn connect(&self) -> StreamResult<reqwest::Response> {
        let mut request = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream");

        if let Some(topics) = &self.topics {
            request = request.query(&[("topics", topics)]);
        }
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        } else if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let connect_error = |source| StreamError::Connect {
            url: self.url.clone(),
            source,
        };
        request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(connect_error)
    }

    fn arm_stability_timer(&self) {
        let internal = Arc::clone(&self.internal);
        let user = Arc::clone(&self.user);
        self.reconnect.arm_stability_timer(move || {
            internal.publish(SystemEvent::ConnectionStable.into());
            user.publish(SystemEvent::ConnectionStable.into());
        });
    }

    /// Read a byte stream to its end, publishing every complete frame
    pub async fn consume<S, E>(&self, stream: S) -> Result<(), E>
    where
        S: Stream<Item = Result<Bytes, E>>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut lines = LineBuffer::new();
        let mut parser = FrameParser::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            trace!(len = chunk.len(), "Received stream chunk");
            for line in lines.push(&chunk) {
                if let Some(frame) = parser.push_line(&line) {
                    self.handle_frame(frame);
                }
            }
        }

        if let Some(rest) = lines.finish() {
            if let Some(frame) = parser.push_line(&rest) {
                self.handle_frame(frame);
            }
        }
        Ok(())
    }

    fn handle_frame(&self, frame: Frame) {
        if frame.is_alive() {
            trace!("Keep-alive received");
            self.publish_both(SystemEvent::Alive.into());
            return;
        }

        let event = RawEvent::from_json(&frame.data).and_then(|raw| decode(&raw));
        match event {
            Ok(event) => {
                debug!(kind = %event.kind(), topic = event.topic(), "Decoded event");
                self.telemetry.event_received(event.kind());
                self.publish_both(event);
            }
            Err(e) => {
                self.telemetry.decode_failed();
                warn!(error = %e, data = %frame.data, "Dropping undecodable event");
            }
        }
    }

    fn publish_both(&self, event: Event) {
        self.internal.publish(event.clone());
        self.user.publish(event);
    }
}
