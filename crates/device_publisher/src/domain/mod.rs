mod publish_service;
mod publisher_config;

pub use publish_service::*;
pub use publisher_config::*;
