pub mod alarm;
pub mod archive;
pub mod bootstrap;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod log;
pub mod object_store;
pub mod signals;
pub mod sink;
pub mod store;
