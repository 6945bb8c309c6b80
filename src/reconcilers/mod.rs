//! Decision logic applied to watched Jobs

pub mod coffee;
