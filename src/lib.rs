pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod controller;
pub mod global;
pub mod meter;
pub mod resolver;
pub mod store;
pub mod supervisor;

#[cfg(test)]
mod testing;
