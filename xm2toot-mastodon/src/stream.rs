//! Reconnecting reader for the user notification stream

use crate::base::MastodonResult;
use crate::client::{is_stream_open, MastodonClient};
use crate::notification::{format_notification, parse_data, NotificationEvent};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use xm2toot_core::bus::{MessageBus, OutboundMessage};

/// Connection state of the current stream attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Open,
    /// Body ended; the attempt is over and a retry follows
    Draining,
    Failed,
}

/// Reads notifications and relays their summaries to the room queue
pub struct StreamReader {
    client: MastodonClient,
    account: String,
    bus: MessageBus,
    retry_delay: Duration,
    state: StreamState,
}

impl StreamReader {
    pub fn new(
        client: MastodonClient,
        account: impl Into<String>,
        bus: MessageBus,
        retry_delay: Duration,
    ) -> Self {
        Self {
            client,
            account: account.into(),
            bus,
            retry_delay,
            state: StreamState::Connecting,
        }
    }

    /// Run until cancelled
    ///
    /// Returns an error only when the outbound queue has been closed.
    pub async fn run(mut self, cancel: CancellationToken) -> MastodonResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Stream reader cancelled");
                Ok(())
            }
            result = self.run_forever() => result,
        }
    }

    async fn run_forever(&mut self) -> MastodonResult<()> {
        loop {
            self.attempt().await?;
            debug!("Retrying stream in {:?}", self.retry_delay);
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    fn set_state(&mut self, state: StreamState) {
        debug!("Stream state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// One connection attempt, from request to end of body
    async fn attempt(&mut self) -> MastodonResult<()> {
        self.set_state(StreamState::Connecting);
        info!("Starting request to {}", self.client.base_url());

        let response = match self.client.open_user_stream().await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Streaming request failed: {}. Sleeping {}s and trying again",
                    e,
                    self.retry_delay.as_secs_f32()
                );
                self.set_state(StreamState::Failed);
                return Ok(());
            }
        };

        let status = response.status();
        if !is_stream_open(status) {
            error!(
                "Response status from streaming endpoint: {}. Sleeping {}s and trying again",
                status,
                self.retry_delay.as_secs_f32()
            );
            self.set_state(StreamState::Failed);
            return Ok(());
        }

        self.set_state(StreamState::Open);
        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    self.relay_data(&event.data)?;
                }
                Err(e) => {
                    warn!(
                        "Stream read failed: {}. Sleeping {}s and trying again",
                        e,
                        self.retry_delay.as_secs_f32()
                    );
                    self.set_state(StreamState::Failed);
                    return Ok(());
                }
            }
        }

        self.set_state(StreamState::Draining);
        info!("Stream ended by server");
        Ok(())
    }

    /// Relay the data of one stream event; returns whether a message was enqueued
    fn relay_data(&self, data: &str) -> MastodonResult<bool> {
        let event = match parse_data(data) {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!("Skipping malformed stream payload ({}): {}", e, data);
                return Ok(false);
            }
        };

        if let NotificationEvent::Unknown { kind } = &event {
            error!("Received unknown notification type: {}", kind);
            return Ok(false);
        }

        match format_notification(&event, &self.account) {
            Some(text) => {
                debug!("Relaying notification: {}", text);
                self.bus.publish_outbound(OutboundMessage::notification(text))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing::{Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use xm2toot_core::bus::MessageSource;
    use xm2toot_core::config::{BridgeConfig, MastodonConfig};

    const FOLLOW: &str =
        r#"{"type":"follow","account":{"display_name":"Ann","url":"https://ex/ann"}}"#;
    const POLL: &str = r#"{"type":"poll","account":{"display_name":"A","url":"u"}}"#;

    /// Counts warn and error records
    struct AnomalyCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for AnomalyCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let level = *event.metadata().level();
            if level == Level::WARN || level == Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_anomalies(f: impl FnOnce()) -> usize {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(AnomalyCounter(count.clone()));
        tracing::subscriber::with_default(subscriber, f);
        count.load(Ordering::SeqCst)
    }

    fn reader(base_url: String, bus: MessageBus, retry_delay: Duration) -> StreamReader {
        let mastodon = MastodonConfig {
            token: "secret".to_string(),
            account: "bot".to_string(),
            ..Default::default()
        };
        let client =
            MastodonClient::with_base_url(base_url, &mastodon, &BridgeConfig::default()).unwrap();
        StreamReader::new(client, "bot", bus, retry_delay)
    }

    #[tokio::test]
    async fn test_relay_follow() {
        let bus = MessageBus::new();
        let mut rx = bus.take_outbound_receiver().await.unwrap();
        let reader = reader("http://127.0.0.1:9".to_string(), bus, Duration::from_secs(10));

        assert!(reader.relay_data(FOLLOW).unwrap());
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.content, "Ann (https://ex/ann) started following bot");
        assert_eq!(msg.source, MessageSource::Notification);
    }

    #[tokio::test]
    async fn test_skipped_payloads_enqueue_nothing() {
        let bus = MessageBus::new();
        let mut rx = bus.take_outbound_receiver().await.unwrap();
        let reader = reader("http://127.0.0.1:9".to_string(), bus, Duration::from_secs(10));

        for data in ["", "109348", "{not json", POLL, r#"{"id":"9","content":"an update"}"#] {
            assert!(!reader.relay_data(data).unwrap(), "{data:?}");
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_type_logs_one_anomaly() {
        let bus = MessageBus::new();
        let mut rx = bus.take_outbound_receiver().await.unwrap();
        let reader = reader("http://127.0.0.1:9".to_string(), bus, Duration::from_secs(10));

        let mut relayed = None;
        let anomalies = count_anomalies(|| relayed = Some(reader.relay_data(POLL).unwrap()));
        assert_eq!(anomalies, 1);
        assert_eq!(relayed, Some(false));
        assert!(rx.try_recv().is_err());

        let anomalies = count_anomalies(|| {
            reader.relay_data(FOLLOW).unwrap();
            reader.relay_data("109348").unwrap();
        });
        assert_eq!(anomalies, 0);
    }

    #[tokio::test]
    async fn test_closed_queue_is_an_error() {
        let bus = MessageBus::new();
        let rx = bus.take_outbound_receiver().await.unwrap();
        drop(rx);
        let reader = reader("http://127.0.0.1:9".to_string(), bus, Duration::from_secs(10));

        assert!(reader.relay_data(FOLLOW).is_err());
    }

    #[tokio::test]
    async fn test_streamed_body_reaches_queue() {
        let mut server = mockito::Server::new_async().await;
        let body = format!(
            ":thump\n\nevent: notification\ndata: {}\n\n:thump\n\nevent: delete\ndata: 109348\n\n\
             event: notification\ndata: {}\n\n",
            FOLLOW,
            r#"{"type":"favourite","account":{"display_name":"Bo","url":"https://ex/bo"},"status":{"url":"https://ex/s/1","visibility":"public","content":""}}"#
        );
        let _mock = server
            .mock("GET", "/api/v1/streaming/user")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let bus = MessageBus::new();
        let mut rx = bus.take_outbound_receiver().await.unwrap();
        let reader = reader(server.url(), bus, Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reader.run(cancel.clone()));

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.content, "Ann (https://ex/ann) started following bot");
        assert_eq!(second.content, "Bo (https://ex/bo) has favorited https://ex/s/1");

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_error_status_is_retried_after_delay() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/streaming/user")
            .with_status(503)
            .expect_at_least(2)
            .create_async()
            .await;

        let bus = MessageBus::new();
        let mut rx = bus.take_outbound_receiver().await.unwrap();
        let reader = reader(server.url(), bus, Duration::from_millis(50));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reader.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(400)).await;
        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());

        mock.assert_async().await;
        assert!(rx.try_recv().is_err());
    }
}
