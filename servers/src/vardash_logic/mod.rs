pub mod config;
pub mod logger;
pub mod page;
pub mod state;
pub mod downstream;
