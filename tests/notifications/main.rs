//! Notifications feed: push patches, read state and removal.

mod support;
mod feed;
