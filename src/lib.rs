pub mod browser;
pub mod checkpoint;
pub mod config;
pub mod contacts;
pub mod model;
pub mod poll;
pub mod render;
pub mod sender;
pub mod sink;
