#![forbid(unsafe_code)]

use bytes::{Buf, BufMut, BytesMut};
use prost::Message;
use thiserror::Error;

/// Default maximum frame payload size.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 2 * 1024 * 1024; // 2 MiB

/// Size of the big-endian `u32` length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum FramingError {
	#[error("frame exceeds maximum size: len={len} max={max}")]
	FrameTooLarge {
		len: usize,
		max: usize,
	},

	#[error("insufficient data: need={need} have={have}")]
	InsufficientData {
		need: usize,
		have: usize,
	},

	#[error("protobuf decode error: {0}")]
	Decode(#[from] prost::DecodeError),

	#[error("protobuf encode error: {0}")]
	Encode(#[from] prost::EncodeError),
}

fn check_len(len: usize, max_frame_size: usize) -> Result<(), FramingError> {
	if len > max_frame_size {
		return Err(FramingError::FrameTooLarge { len, max: max_frame_size });
	}
	Ok(())
}

fn peek_len(src: &[u8]) -> Option<usize> {
	let header: [u8; FRAME_HEADER_LEN] = src.get(..FRAME_HEADER_LEN)?.try_into().ok()?;
	Some(u32::from_be_bytes(header) as usize)
}

/// Encode a protobuf message into a length-prefixed frame.
pub fn encode_frame<M: Message>(msg: &M, max_frame_size: usize) -> Result<Vec<u8>, FramingError> {
	let mut buf = BytesMut::new();
	encode_frame_into(&mut buf, msg, max_frame_size)?;
	Ok(buf.to_vec())
}

/// Append an encoded frame into the provided buffer.
pub fn encode_frame_into<M: Message>(buf: &mut BytesMut, msg: &M, max_frame_size: usize) -> Result<(), FramingError> {
	let payload_len = msg.encoded_len();
	check_len(payload_len, max_frame_size)?;

	buf.reserve(FRAME_HEADER_LEN + payload_len);
	buf.put_u32(payload_len as u32);
	msg.encode(buf)?;
	Ok(())
}

/// Decode a single frame from the start of `src`, returning the message and the bytes consumed.
pub fn decode_frame<M: Message + Default>(src: &[u8], max_frame_size: usize) -> Result<(M, usize), FramingError> {
	let Some(len) = peek_len(src) else {
		return Err(FramingError::InsufficientData {
			need: FRAME_HEADER_LEN,
			have: src.len(),
		});
	};
	check_len(len, max_frame_size)?;

	let need = FRAME_HEADER_LEN + len;
	if src.len() < need {
		return Err(FramingError::InsufficientData { need, have: src.len() });
	}

	let msg = M::decode(&src[FRAME_HEADER_LEN..need])?;
	Ok((msg, need))
}

/// Try to decode a single frame from a growable buffer; `Ok(None)` means more bytes are needed.
pub fn try_decode_frame_from_buffer<M: Message + Default>(
	buf: &mut BytesMut,
	max_frame_size: usize,
) -> Result<Option<M>, FramingError> {
	let Some(len) = peek_len(&buf[..]) else {
		return Ok(None);
	};
	check_len(len, max_frame_size)?;

	if buf.len() < FRAME_HEADER_LEN + len {
		return Ok(None);
	}

	buf.advance(FRAME_HEADER_LEN);
	let payload = buf.split_to(len);
	let msg = M::decode(payload.freeze())?;
	Ok(Some(msg))
}
