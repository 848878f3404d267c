// ABOUTME: HTTP layer - request keys and the coordinated API client.
// ABOUTME: Callers get dedup, throttle and retry without building keys by hand.

mod client;
mod key;

pub use client::{ApiClient, ApiResponse, BASE_URL_VAR};
pub use key::RequestKey;

#[cfg(test)]
mod key_test;
