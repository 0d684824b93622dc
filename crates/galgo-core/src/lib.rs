//! Core galgo library (session catalog, lifecycle, remote store client).

pub mod catalog;
pub mod config;
pub mod gateway;
pub mod lifecycle;
pub mod loader;
pub mod mirror;
