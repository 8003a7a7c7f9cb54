//! Agent runtime wiring channel and dispatcher together

use crate::channel::{Channel, ChannelConfig};
use crate::dispatcher::Dispatcher;
use crate::scope::EvalScope;
use heresy_proto::HeresyConfig;
use tracing::{debug, info};

/// A running agent: one channel, one dispatcher
///
/// Messages are handled strictly one at a time; a long `eval` holds up
/// the next inbound message until it returns.
pub struct Agent<S: EvalScope> {
    channel: Channel,
    dispatcher: Dispatcher<S>,
}

impl<S: EvalScope> Agent<S> {
    /// Build an agent from the embedded configuration
    ///
    /// Returns `None` when no controller address is configured, in which
    /// case no channel is opened at all.
    pub fn from_config(config: &HeresyConfig, scope: S) -> Option<Self> {
        let url = config.rpc_url()?;
        Some(Self::connect(ChannelConfig::new(url), scope))
    }

    /// Connect to the controller described by `config`
    pub fn connect(config: ChannelConfig, scope: S) -> Self {
        info!(url = %config.url, reconnect = config.reconnect, "Starting agent channel");
        Self {
            channel: Channel::connect(config),
            dispatcher: Dispatcher::new(scope),
        }
    }

    /// The underlying channel
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Process inbound messages until the channel shuts down
    pub async fn run(mut self) -> Dispatcher<S> {
        while let Some(message) = self.channel.recv().await {
            debug!("Agent received {} message", message.kind());
            for reply in self.dispatcher.dispatch(message) {
                self.channel.send(reply);
            }
        }
        info!(url = %self.channel.url(), "Agent channel finished");
        self.dispatcher
    }
}
