// The two delivery channels: REST (request/response) and the persistent
// push connection.  They are fully independent; a broken socket never blocks
// a REST send or fetch.

pub mod api;
pub mod socket;
pub mod transport;

pub use api::ApiClient;
pub use socket::{spawn_socket, SocketCommand, SocketConfig, SocketNotification};
pub use transport::{AttachmentPart, MessageTransport};
