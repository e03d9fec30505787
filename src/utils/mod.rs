//! Environment and clock helpers shared across the crate.

pub mod env;
pub mod time;

pub use env::{get_env_with_prefix, parse_env_with_prefix};
pub use time::unix_now;
