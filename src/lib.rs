pub mod capabilities;
pub mod cli;
pub mod coordinator;
pub mod engine;
pub mod recorder;
pub mod storage;
pub mod triggers;
