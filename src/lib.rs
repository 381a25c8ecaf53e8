//! tunemirror - Live-synchronized music library client engine

pub mod api;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod gesture;
pub mod library;
pub mod session;
pub mod sync;
pub mod upload;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
