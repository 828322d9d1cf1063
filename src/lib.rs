pub mod app;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod export;
pub mod generator;
pub mod output;
pub mod progress;
pub mod scan;
pub mod search;
pub mod session;
pub mod store;
pub mod timer;
pub mod tui;
