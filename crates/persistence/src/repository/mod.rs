//! Repository implementations for database operations

pub mod ohlc;
pub mod snapshots;

pub use ohlc::*;
pub use snapshots::*;
