#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fake_relay;
pub mod origin_server;
pub mod proxy_server;

pub use fake_relay::{FakeRelay, RecordedRequest, RelayMode};
pub use origin_server::OriginServer;
pub use proxy_server::TestProxyServer;
