pub mod config;
pub mod constants;
pub mod course;
pub mod enemy;
pub mod error;
pub mod physics;
pub mod rng;
pub mod runtime;
pub mod server_protocol;
pub mod server_utils;
pub mod session;
pub mod types;
