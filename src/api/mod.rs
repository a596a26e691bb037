//! HTTP API for the ward dashboard
//!
//! Routes, request handlers and the error type they share.

pub mod error;
pub mod handlers;
pub mod routes;

pub use routes::configure;
