//! HTTP/JSON control surface
//!
//! Thin transport over the benchmark registry and the active-run gate:
//! start, stop, and status plus a health probe.

pub mod handlers;
pub mod server;

pub use server::RestServer;
