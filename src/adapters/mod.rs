//! Adapters to the world outside the controller: the coffee machine, the
//! Job annotations, and the deployment manifest

pub mod coffee_machine;
pub mod job_marker;
pub mod manifest_builder;
