//! Implements the framing of the unit stream: every frame is the length of its
//! body, a kind header, and the body itself.

use std::io::{self, Read, Write};

use crate::ProtocolError;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

type HeaderType = u32;
const HEADER_SIZE: usize = size_of::<HeaderType>();

/// Kind header of the stream header frame.
pub const STREAM_H: HeaderType = 0;
pub const TWO_KEY_MATRICES_H: HeaderType = 1;
pub const TWO_KEY_TENSORS_H: HeaderType = 2;
pub const MATRICES_H: HeaderType = 3;
pub const OPAQUE_H: HeaderType = 4;

/// Largest frame body accepted, both while writing and while reading.
pub const MAX_FRAME_LEN: LenType = 1 << 30;

/// Writes a single frame into `sink`.
///
/// # Errors
/// A `ProtocolError` wrapped in an io error if `body` is larger than `limit`.
/// Nothing is written in that case.
pub fn write_frame<W: Write>(
    sink: &mut W,
    kind: HeaderType,
    body: &[u8],
    limit: LenType,
) -> io::Result<()> {
    check_body_len(body.len() as LenType, limit)?;

    let len = (HEADER_SIZE + body.len()) as LenType;
    sink.write_all(&len.to_be_bytes())?;
    sink.write_all(&kind.to_be_bytes())?;
    sink.write_all(body)
}

/// Reads a single frame from `src` into `buf`, returning its kind header.
///
/// `buf` only grows with the bytes actually present in `src`, whatever length
/// the frame declares.
///
/// # Returns
/// `None` if `src` is exhausted right at a frame boundary.
///
/// # Errors
/// An `UnexpectedEof` io error if the stream ends inside a frame, or a
/// `ProtocolError` wrapped in an io error for oversized or headerless frames.
pub fn read_frame<R: Read>(src: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<HeaderType>> {
    let mut size = [0; LEN_TYPE_SIZE];
    if !fill_or_eof(src, &mut size)? {
        return Ok(None);
    }

    let len = LenType::from_be_bytes(size);
    let Some(body_len) = len.checked_sub(HEADER_SIZE as LenType) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            ProtocolError::BadHeader(format!("frame of {len} bytes has no kind header")),
        ));
    };
    check_body_len(body_len, MAX_FRAME_LEN)?;

    let mut header = [0; HEADER_SIZE];
    src.read_exact(&mut header)?;

    buf.clear();
    let read = src.by_ref().take(body_len).read_to_end(buf)?;
    if (read as LenType) < body_len {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }

    Ok(Some(HeaderType::from_be_bytes(header)))
}

fn check_body_len(len: LenType, limit: LenType) -> io::Result<()> {
    if len > limit {
        let err = ProtocolError::FrameTooLarge { len, limit };
        return Err(io::Error::new(io::ErrorKind::InvalidData, err));
    }

    Ok(())
}

/// Returns whether `src` still has any byte left.
pub fn has_more<R: Read>(src: &mut R) -> io::Result<bool> {
    let mut byte = [0; 1];
    fill_or_eof(src, &mut byte)
}

/// Fills `buf` completely, unless `src` is already exhausted.
///
/// # Returns
/// `false` if not a single byte could be read.
fn fill_or_eof<R: Read>(src: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(true)
}
