pub mod config;
pub mod demo;
pub mod mutate;
pub mod sim;
