pub mod app;
pub mod classifier;
pub mod collector;
pub mod config;
pub mod github;
pub mod policy;
pub mod signature;
