pub mod auditor;
pub mod config;
pub mod errors;
pub mod generation;
pub mod observer;
pub mod orchestrator;
pub mod payload;
pub mod phase;
pub mod research;
pub mod run;
pub mod server;
pub mod workers;
