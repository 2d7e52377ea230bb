pub mod agent;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod merge;
pub mod parse;
pub mod prompt;
pub mod qc;
pub mod records;
pub mod retry;
pub mod stages;
pub mod state;
pub mod storage;
pub mod supervisor;
pub mod types;
pub mod validate;

pub use types::*;
