pub mod backend;
pub mod config;
pub mod contract;
pub mod document;
pub mod errors;
pub mod ids;
pub mod observer;
pub mod synthesis;
pub mod tokens;
