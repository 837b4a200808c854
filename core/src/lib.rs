pub mod action;
pub mod config;
pub mod export;
pub mod str_interp;
pub mod style;
pub mod testing;

pub use crate::config::Config;
