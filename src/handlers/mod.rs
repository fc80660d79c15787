//! HTTP API handlers.

pub mod search;
