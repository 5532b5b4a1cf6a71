//! HTTP API: configuration, guard middleware and the account endpoints.

pub mod app;
pub mod config;
pub mod context;
pub mod demo;
pub mod middleware;
