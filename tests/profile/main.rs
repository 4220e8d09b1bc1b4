//! Profile resource: updates, avatar upload and polling.

mod support;
mod profile;
