//! Analysis operations.
//!
//! This module holds the fan-out transaction overview and the
//! single-endpoint facade, both built on the upstream pipeline.

pub mod aggregator;
pub mod facade;

pub use aggregator::Aggregator;
pub use facade::Facade;
