//! HTTP server for the tribuna blogging platform.

pub mod server;
