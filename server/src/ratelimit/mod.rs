//! Rate limiting module for protecting against abuse.
//!
//! Fixed-window counters keyed by client address, tiered per endpoint
//! class. Backed by process memory, or Redis when configured.

pub mod config;
pub mod constants;
pub mod error;
pub mod ip;
pub mod limiter;
pub mod middleware;
pub mod types;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use ip::*;
pub use limiter::*;
pub use middleware::{rate_limit_by_ip, with_category};
pub use types::*;
