//! Weft coordination engine: work items, agents, targets, event bus, and
//! the subscription/pagination/ETag machinery that sits in front of them.
//!
//! This crate is transport-agnostic: the concrete HTTP/WebSocket wiring,
//! CLI, config loading, and auth middleware live in the `weft-server`
//! binary crate and are adapters over what is here.

pub mod agent;
pub mod auth;
pub mod batch;
pub mod bus_adapter;
pub mod cursor;
pub mod error;
pub mod etag;
pub mod event;
pub mod hub;
pub mod model;
pub mod project;
pub mod subscription;
pub mod target;
pub mod work;

pub use error::{Result, WeftError};
