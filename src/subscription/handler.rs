use tracing::warn;

use crate::reconcile::Reconciler;
use crate::store::ChangeEvent;

/// Receives what a push channel delivers.
pub trait ChannelHandler: Send + Sync + 'static {
    fn on_event(&self, event: &ChangeEvent);

    /// Called after the channel was reopened; events may have been missed.
    fn on_reconnect(&self) {}
}

impl<T: Clone + Send + 'static> ChannelHandler for Reconciler<T> {
    fn on_event(&self, event: &ChangeEvent) {
        if let Err(err) = self.handle_event(event) {
            warn!(identity = %self.slot().identity(), seq = event.seq, error = %err, "event reconciliation failed");
        }
    }

    fn on_reconnect(&self) {
        if let Err(err) = self.reload() {
            warn!(identity = %self.slot().identity(), error = %err, "reload after reconnect failed");
        }
    }
}

/// Adapts a closure into a [`ChannelHandler`].
pub struct FnHandler<F>(pub F);

impl<F> ChannelHandler for FnHandler<F>
where
    F: Fn(&ChangeEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &ChangeEvent) {
        (self.0)(event)
    }
}

/// Wrap a closure as a handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&ChangeEvent) + Send + Sync + 'static,
{
    FnHandler(f)
}
