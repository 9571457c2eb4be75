// Active session history: sampling, in-memory window, hourly archive, interval aggregation

pub mod aggregation;
pub mod archive;
pub mod ash;
pub mod buffer;
pub mod config;
pub mod error;
pub mod housekeeping;
pub mod models;
pub mod source;
pub mod statements;
pub mod worker;
