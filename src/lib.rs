#![forbid(unsafe_code)]

pub mod aggregate;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod formats;
pub mod ingest;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod raw_store;
pub mod report;
pub mod table;
