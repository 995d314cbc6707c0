//! Callback priority tiers
//!
//! Callbacks run in ascending priority; ties keep registration order.

pub const HIGH: i32 = 5;
pub const DEFAULT: i32 = 10;
pub const LOW: i32 = 50;
