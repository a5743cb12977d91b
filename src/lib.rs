pub mod conf;
pub mod connect;
pub mod core;
pub mod executor;
pub mod query;
pub mod runner;
pub mod sink;
pub mod upload;

#[cfg(feature = "testutil")]
pub mod testutil;
