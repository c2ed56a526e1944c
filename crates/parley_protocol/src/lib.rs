#![forbid(unsafe_code)]

mod convert;
pub mod framing;
#[allow(clippy::large_enum_variant)]
pub mod pb;

pub use convert::ConvertError;
pub use framing::{
	DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_LEN, FramingError, decode_frame, encode_frame, encode_frame_into,
	try_decode_frame_from_buffer,
};

/// ALPN identifier negotiated on every QUIC connection.
pub const ALPN: &[u8] = b"parley-v1";

/// Protocol version constants.
pub mod version {
	/// Current protocol major version (v1).
	pub const PROTOCOL_MAJOR: u32 = 1;
	/// Current protocol minor version.
	pub const PROTOCOL_MINOR: u32 = 0;

	/// Compact representation carried in `Envelope.version`.
	pub const PROTOCOL_VERSION_U32: u32 = (PROTOCOL_MAJOR << 16) | PROTOCOL_MINOR;
}

/// Error codes carried in `Error.code` and `CommandResult.error_code`.
pub mod codes {
	pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
	pub const NOT_FOUND: &str = "NOT_FOUND";
	pub const PERSISTENCE: &str = "PERSISTENCE";
	pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
	pub const PROTOCOL: &str = "PROTOCOL";
}
