pub mod domain;
pub mod mqtt;
pub mod w1;

mod device_publisher;

pub use device_publisher::*;
