pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod types;
pub mod workbook;
