//! Command processor: consumes room commands, publishes replies

use crate::directive::DirectiveRegistry;
use crate::stats::StatsDirective;
use std::sync::Arc;
use tracing::{debug, error, info};
use xm2toot_core::bus::{Command, CommandReceiver, MessageBus, OutboundMessage};
use xm2toot_mastodon::AccountLookup;

/// Processes commands one at a time
pub struct CommandProcessor {
    registry: DirectiveRegistry,
    bus: MessageBus,
}

impl CommandProcessor {
    pub fn new(registry: DirectiveRegistry, bus: MessageBus) -> Self {
        Self { registry, bus }
    }

    /// Processor with the built-in directives
    pub fn with_defaults(api: Arc<dyn AccountLookup>, bus: MessageBus) -> Self {
        let mut registry = DirectiveRegistry::new();
        registry.register(Arc::new(StatsDirective::new(api)));
        Self::new(registry, bus)
    }

    /// Consume commands until the queue closes
    ///
    /// A reply is published only once its directive has fully completed.
    pub async fn run(self, mut commands: CommandReceiver) -> xm2toot_core::Result<()> {
        info!(
            "Command processor started with directives: {}",
            self.registry.names().join(", ")
        );

        while let Some(command) = commands.recv().await {
            let reply = self.process(&command).await;
            self.bus.publish_outbound(reply)?;
        }

        info!("Command queue closed, stopping command processor");
        Ok(())
    }

    /// Resolve one command to its reply slot
    ///
    /// The whole command text must equal a directive name; directives
    /// take no arguments.
    pub async fn process(&self, command: &Command) -> OutboundMessage {
        let name = command.text.as_str();

        let Some(directive) = self.registry.get(name) else {
            debug!("Ignoring unknown command {:?} from {}", command.text, command.sender);
            return OutboundMessage::no_reply();
        };

        match directive.execute().await {
            Ok(reply) => {
                debug!("Command {} from {} answered", name, command.sender);
                OutboundMessage::reply(reply)
            }
            Err(e) => {
                error!("Command {} from {} failed: {}", name, command.sender, e);
                OutboundMessage::reply(directive.failure_reply())
            }
        }
    }
}
