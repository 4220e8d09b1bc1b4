//! REST surface integration tests.
//!
//! Starts an axum server and exercises it with reqwest.

mod support;
mod rest;
