//! Listener thread body: poll, dispatch, reconnect.

use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{transition, ChannelHandler, ChannelState, Counters, ListenerConfig, SharedState, SubscriptionStats};
use crate::store::{ChangeChannel, Changefeed, ChannelSpec};

pub(crate) struct Listener {
    pub(crate) identity: String,
    pub(crate) feed: Arc<dyn Changefeed>,
    pub(crate) spec: ChannelSpec,
    pub(crate) config: ListenerConfig,
    pub(crate) state: SharedState,
    pub(crate) counters: Arc<Counters>,
}

enum Wait {
    Elapsed,
    Stopped,
}

impl Listener {
    pub(crate) fn run<H: ChannelHandler>(
        self,
        channel: Box<dyn ChangeChannel>,
        handler: H,
        stop_rx: Receiver<()>,
    ) -> SubscriptionStats {
        let mut stats = SubscriptionStats::default();
        let mut current = Some(channel);

        loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            if current.is_none() {
                // reconnecting
                if let Wait::Stopped = self.pause(&stop_rx) {
                    break;
                }
                match self.feed.open_channel(&self.spec) {
                    Ok(channel) => {
                        self.counters.opened.fetch_add(1, Ordering::SeqCst);
                        current = Some(channel);
                        stats.reconnects += 1;
                        transition(&self.state, ChannelState::Subscribed);
                        debug!(identity = %self.identity, "channel reopened");
                        handler.on_reconnect();
                    }
                    Err(err) => {
                        warn!(identity = %self.identity, error = %err, "reopen failed");
                    }
                }
                continue;
            }
            let Some(channel) = current.as_mut() else {
                continue;
            };

            match channel.poll(self.config.poll_timeout) {
                Ok(Some(event)) => {
                    stats.events += 1;
                    handler.on_event(&event);
                }
                Ok(None) => {}
                Err(err) => {
                    stats.errors += 1;
                    warn!(identity = %self.identity, error = %err, "channel error");
                    transition(&self.state, ChannelState::Error);
                    if let Some(mut broken) = current.take() {
                        self.close(broken.as_mut());
                    }
                    transition(&self.state, ChannelState::Reconnecting);
                }
            }
        }

        if let Some(mut channel) = current.take() {
            self.close(channel.as_mut());
        }
        stats
    }

    fn close(&self, channel: &mut dyn ChangeChannel) {
        channel.close();
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn pause(&self, stop_rx: &Receiver<()>) -> Wait {
        match stop_rx.recv_timeout(self.config.reconnect_delay) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Wait::Stopped,
            Err(RecvTimeoutError::Timeout) => Wait::Elapsed,
        }
    }
}
