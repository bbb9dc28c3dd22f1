pub mod reqwest_client;
pub mod tcp_server;
pub mod tracking;

pub use reqwest_client::ReqwestRelayClient;
pub use tcp_server::ProxyListener;
pub use tracking::*;
