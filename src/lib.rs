#[macro_use]
extern crate slog;

pub mod config;
pub mod ipam;
pub mod server;
pub mod web;
