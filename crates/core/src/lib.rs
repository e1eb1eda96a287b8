//! Core types, sample validation, and CPR quality scoring for the ResqPulse gateway.

pub mod auth;
pub mod emergency;
pub mod error;
pub mod limits;
pub mod sample;
pub mod scoring;
pub mod session;

pub use auth::*;
pub use emergency::*;
pub use error::{Error, Result};
pub use sample::*;
pub use scoring::{score_sample, QualityScore};
pub use session::*;
