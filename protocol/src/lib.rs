//! Wire format shared by the mobile status server and its clients.
//!
//! A session is a single exchange: the client sends its credentials, the
//! server answers with a gzip-compressed authentication flag and, on
//! success, the full status tree.

pub mod alert;
pub mod codec;
pub mod de;
pub mod node;
pub mod ser;

pub use alert::{AlertLevel, InvalidAlertLevel};
pub use codec::{
    CodecError, MAX_CHILDREN, MAX_DEPTH, decode_node, decode_response, encode_credentials,
    encode_node, encode_response,
};
pub use de::{decode_modified_utf8, read_utf};
pub use node::NodeSnapshot;
pub use ser::{MAX_UTF_LEN, encode_modified_utf8, write_utf};

/// TCP port the mobile service listens on.
pub const DEFAULT_PORT: u16 = 4585;

/// Returns the protocol crate version string.
pub fn protocol_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
