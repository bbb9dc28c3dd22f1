mod head;
mod listener;
mod passthrough;

pub use head::{read_request_head, MAX_HEAD_BYTES};
pub use listener::{connection_established, handle_connection, ProxyListener};
