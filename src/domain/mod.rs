pub mod bridge;
pub mod errors;
pub mod models;

pub use bridge::TunnelBridge;
pub use errors::*;
pub use models::*;
