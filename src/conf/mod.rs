mod config;
mod s3;
mod warehouse;

pub use config::Config;
pub use s3::S3Config;
pub use warehouse::{ConnectionConfig, WarehouseConfig, WarehouseType};
