pub mod request;
pub mod resolver;
pub mod service;
pub mod wildcard;

pub use anyhow::Result;
