//! Activity tracking: batching, flusher thread and failure handling.

mod support;
mod tracking;
