//! Security utilities

pub mod timing;

pub use timing::constant_time_eq;
