pub mod config;
pub mod controller;
pub mod hw;
pub mod mapping;
pub mod mqtt;
