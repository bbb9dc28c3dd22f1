//! Local forward proxy that carries HTTP CONNECT tunnels inside streaming
//! POST requests to a remote relay.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
