pub mod app;
pub mod cache;
pub mod config;
pub mod dates;
pub mod domain;
pub mod error;
pub mod filters;
pub mod fs_util;
pub mod ncbi;
pub mod output;
pub mod preview;
pub mod report;
pub mod store;
pub mod typing;
