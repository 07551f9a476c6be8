pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod forecast;
pub mod generator;
pub mod output;
pub mod plots;
pub mod records;
