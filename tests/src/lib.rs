//! Shared helpers for the gateway's end-to-end tests.

pub mod fixtures;
pub mod mocks;
