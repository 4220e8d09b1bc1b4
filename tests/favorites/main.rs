//! Favorites resource end to end over the in-memory backend.

mod support;
mod toggle;
