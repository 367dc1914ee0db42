pub mod adb;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod models;
