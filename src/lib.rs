//! kubespresso
//!
//! A Kubernetes controller that watches Jobs and brews a coffee for the
//! owner of every long-running one, at most once a day per owner.

pub mod adapters;
pub mod cluster;
pub mod config;
pub mod controllers;
pub mod error;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod metrics;
pub mod reconcilers;

pub use error::{Error, Result};
