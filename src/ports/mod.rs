pub mod relay;
pub mod tracking;

pub use relay::{DownloadStream, RelayPort, RelayRequest, RelayResponse, UploadStream};
pub use tracking::TrackingPort;
