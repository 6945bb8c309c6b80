//! Prometheus metrics for kubespresso
//!
//! This module exposes metrics for monitoring the controller and the
//! coffee it brews.

pub mod prometheus;

pub use prometheus::*;
