//! Task supervisor
//!
//! Runs the bridge units side by side. The first unit to finish, for any
//! reason, ends the run: the rest are cancelled, given a grace period to
//! clean up, and aborted if they are still running after it.

use anyhow::Result;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use xm2toot_core::StopSignal;

type UnitOutput = (&'static str, Result<()>);

pub struct Supervisor {
    tasks: JoinSet<UnitOutput>,
    cancel: CancellationToken,
    grace: Duration,
}

impl Supervisor {
    pub fn new(grace: Duration) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel: CancellationToken::new(),
            grace,
        }
    }

    /// Token cancelled once the first unit finishes
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn<F>(&mut self, name: &'static str, unit: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        debug!("Starting {}", name);
        self.tasks.spawn(async move {
            let result = AssertUnwindSafe(unit)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(anyhow::anyhow!("panicked: {}", panic_message(&*panic)))
                });
            (name, result)
        });
    }

    /// Wait for the first unit to finish, then stop the others
    ///
    /// Fails if any unit returned an error or panicked.
    pub async fn run(mut self) -> Result<()> {
        let mut failed = Vec::new();

        let Some(first) = self.tasks.join_next().await else {
            return Ok(());
        };
        if let Some(name) = record(first, &mut failed) {
            info!("{} finished, stopping remaining tasks", name);
        }
        self.cancel.cancel();

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(self.grace, async {
            while let Some(result) = tasks.join_next().await {
                record(result, &mut failed);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "{} task(s) still running after {:?}, aborting",
                self.tasks.len(),
                self.grace
            );
            self.tasks.abort_all();
            while let Some(result) = self.tasks.join_next().await {
                record(result, &mut failed);
            }
        }

        if failed.is_empty() {
            info!("All tasks stopped");
            Ok(())
        } else {
            anyhow::bail!("{} failed", failed.join(", "))
        }
    }
}

/// Log a unit's outcome, returning its name if it ran to completion
fn record(
    result: std::result::Result<UnitOutput, JoinError>,
    failed: &mut Vec<String>,
) -> Option<&'static str> {
    match result {
        Ok((name, Ok(()))) => {
            debug!("{} stopped", name);
            Some(name)
        }
        Ok((name, Err(e))) => {
            error!("{} failed: {:#}", name, e);
            failed.push(name.to_string());
            Some(name)
        }
        Err(e) => {
            debug!("Task aborted: {}", e);
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Unit that finishes on Ctrl-C or when a stop is requested
pub async fn wait_for_stop(stop: StopSignal, cancel: CancellationToken) -> Result<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received SIGINT");
            stop.trigger("SIGINT");
        }
        _ = stop.wait() => {}
        _ = cancel.cancelled() => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use xm2toot_channels::memory::{memory_transport, Outgoing};
    use xm2toot_channels::{BridgeSettings, ChatSessionBridge};
    use xm2toot_commands::CommandProcessor;
    use xm2toot_core::bus::MessageBus;
    use xm2toot_core::config::{BridgeConfig, MastodonConfig};
    use xm2toot_mastodon::{MastodonClient, StreamReader};

    async fn broken() -> Result<()> {
        anyhow::bail!("boom")
    }

    async fn crash() -> Result<()> {
        panic!("unit crashed")
    }

    #[tokio::test]
    async fn test_first_completion_cancels_the_rest() {
        let mut supervisor = Supervisor::new(Duration::from_secs(5));
        let cancel = supervisor.cancel_token();
        let observed = Arc::new(AtomicBool::new(false));

        supervisor.spawn("quick", async { Ok(()) });
        let flag = observed.clone();
        supervisor.spawn("waiter", async move {
            cancel.cancelled().await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        supervisor.run().await.unwrap();
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let mut supervisor = Supervisor::new(Duration::from_secs(5));
        let cancel = supervisor.cancel_token();

        supervisor.spawn("broken", broken());
        supervisor.spawn("waiter", async move {
            cancel.cancelled().await;
            Ok(())
        });

        let err = supervisor.run().await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_panicked_unit_is_reported_by_name() {
        let mut supervisor = Supervisor::new(Duration::from_secs(5));
        let cancel = supervisor.cancel_token();

        supervisor.spawn("crasher", crash());
        supervisor.spawn("waiter", async move {
            cancel.cancelled().await;
            Ok(())
        });

        let err = supervisor.run().await.unwrap_err();
        assert_eq!(err.to_string(), "crasher failed");
    }

    #[test]
    fn test_panic_message_payloads() {
        let text: Box<dyn Any + Send> = Box::new("static text");
        assert_eq!(panic_message(&*text), "static text");
        let owned: Box<dyn Any + Send> = Box::new(String::from("formatted"));
        assert_eq!(panic_message(&*owned), "formatted");
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*other), "unknown panic");
    }

    #[tokio::test]
    async fn test_stragglers_are_aborted_after_grace() {
        let mut supervisor = Supervisor::new(Duration::from_millis(50));
        supervisor.spawn("quick", async { Ok(()) });
        supervisor.spawn("stubborn", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        let result = tokio::time::timeout(Duration::from_secs(5), supervisor.run()).await;
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_empty_supervisor_returns() {
        Supervisor::new(Duration::from_secs(1)).run().await.unwrap();
    }

    /// Accepts one connection, answers with stream headers and never sends a body
    async fn hanging_stream_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      Content-Type: text/event-stream\r\n\
                      Transfer-Encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(3600)).await;
            drop(socket);
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_admin_quit_stops_reader_and_leaves_room() {
        let base_url = hanging_stream_server().await;
        let bus = MessageBus::new();
        let stop = StopSignal::new();

        let mastodon = MastodonConfig {
            token: "secret".to_string(),
            account: "bot".to_string(),
            ..Default::default()
        };
        let client =
            MastodonClient::with_base_url(base_url, &mastodon, &BridgeConfig::default()).unwrap();
        let reader = StreamReader::new(client.clone(), "bot", bus.clone(), Duration::from_secs(10));
        let processor = CommandProcessor::with_defaults(Arc::new(client), bus.clone());

        let (transport, mut handle) = memory_transport();
        let settings = BridgeSettings {
            room: "room@conference.ex".to_string(),
            nick: "bot".to_string(),
            admins: vec!["admin@ex".to_string()],
        };
        let bridge = ChatSessionBridge::new(transport, settings, bus, processor, stop.clone());

        let mut supervisor = Supervisor::new(Duration::from_secs(5));
        let cancel = supervisor.cancel_token();
        let reader_cancel = cancel.clone();
        supervisor.spawn("stream reader", async move {
            reader.run(reader_cancel).await.map_err(anyhow::Error::from)
        });
        let bridge_cancel = cancel.clone();
        supervisor.spawn("chat session", async move {
            bridge.run(bridge_cancel).await.map_err(anyhow::Error::from)
        });
        supervisor.spawn("stop signal", wait_for_stop(stop, cancel));
        let run = tokio::spawn(supervisor.run());

        let joined = tokio::time::timeout(Duration::from_secs(5), handle.next_outgoing())
            .await
            .unwrap();
        assert!(matches!(joined, Some(Outgoing::Join { .. })));

        handle.direct_message("admin@ex/phone", "quit");
        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(handle.drain(), vec![Outgoing::Leave, Outgoing::Closed]);
    }
}
