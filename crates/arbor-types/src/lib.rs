//! Wire types shared by the Arbor API handlers and server.

pub mod api;
pub mod models;
