//! Payment provider API client for vacdesk.
//!
//! A thin async client for the redirect-checkout payment provider. It only
//! knows how to create a payment and poll its status; deciding what a
//! succeeded payment entitles the user to is the engine's job.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod types;

pub use client::ProviderClient;
pub use error::{PayError, Result};
pub use types::{Amount, ProviderPayment, ProviderStatus};
