pub mod config;
pub mod events;
pub mod executors;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod native;
pub mod orchestration;
pub mod session;
pub mod task;
