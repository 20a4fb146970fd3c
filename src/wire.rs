//! Binary stream primitives shared by the signature and delta codecs.
//!
//! Both artifacts open with an ASCII magic, a version byte, and a metadata
//! block, then run records until end of stream. Integers are little-endian.
//! Strings (metadata JSON, legacy algorithm names) are UTF-8 prefixed with a
//! 7-bit variable-length byte count, the encoding the original tooling's
//! binary writers used, which the legacy fixtures pin.
//!
//! Truncation inside a header, metadata block, or record is a format error;
//! a clean end of stream between records is the normal terminator.

use std::io::Read;

use crate::error::DeltaError;

/// The wire format family a signature or delta stream was recognized as.
///
/// The current format is read and written; the legacy format is read-only,
/// kept so artifacts produced by earlier tooling stay usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// The current format (`FRSNCSG` / `FRSNCDLTA` magics).
    Current,
    /// The legacy format (`OCTOSIG` / `OCTODELTA` magics), read-only.
    Legacy,
}

/// Magic of the current signature format.
pub(crate) const SIGNATURE_MAGIC: &[u8] = b"FRSNCSG";
/// Magic of the current delta format.
pub(crate) const DELTA_MAGIC: &[u8] = b"FRSNCDLTA";
/// Magic of the legacy signature format (read-only support).
pub(crate) const LEGACY_SIGNATURE_MAGIC: &[u8] = b"OCTOSIG";
/// Magic of the legacy delta format (read-only support).
pub(crate) const LEGACY_DELTA_MAGIC: &[u8] = b"OCTODELTA";

/// Version byte shared by all supported formats.
pub(crate) const FORMAT_VERSION: u8 = 0x01;

/// End-of-metadata marker of the legacy formats.
pub(crate) const LEGACY_END_OF_METADATA: &[u8] = b">>>";

/// Command tag: copy a range of the base stream.
pub(crate) const COPY_COMMAND: u8 = 0x60;
/// Command tag: literal bytes follow.
pub(crate) const DATA_COMMAND: u8 = 0x80;

/// Metadata strings are small; anything claiming more than this is garbage.
const MAX_STRING_LEN: u32 = 16 * 1024 * 1024;

/// Wraps a stream and counts the bytes read through it, so the applier can
/// report how far into a delta stream it is.
pub(crate) struct Counted<R> {
    inner: R,
    consumed: u64,
}

impl<R> Counted<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, consumed: 0 }
    }

    /// Bytes read through the wrapper so far.
    pub(crate) fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl<R: Read> Read for Counted<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

#[cfg(feature = "async-io")]
impl<R: futures_io::AsyncRead + Unpin> futures_io::AsyncRead for Counted<R> {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut [u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let this = &mut *self;
        let poll = std::pin::Pin::new(&mut this.inner).poll_read(cx, buf);
        if let std::task::Poll::Ready(Ok(n)) = &poll {
            this.consumed += *n as u64;
        }
        poll
    }
}

pub(crate) fn truncated(context: &str) -> DeltaError {
    DeltaError::format(format!("unexpected end of stream while reading {}", context))
}

fn map_eof(e: std::io::Error, context: &str) -> DeltaError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        truncated(context)
    } else {
        DeltaError::Io(e)
    }
}

/// Reads exactly `buf.len()` bytes, mapping a short read to a format error.
pub(crate) fn read_exact(
    reader: &mut impl Read,
    buf: &mut [u8],
    context: &str,
) -> Result<(), DeltaError> {
    reader.read_exact(buf).map_err(|e| map_eof(e, context))
}

/// Reads exactly `buf.len()` bytes, or returns `false` on a clean end of
/// stream before the first byte. A partial record is a format error.
pub(crate) fn read_exact_or_eof(
    reader: &mut impl Read,
    buf: &mut [u8],
    context: &str,
) -> Result<bool, DeltaError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(truncated(context));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(DeltaError::Io(e)),
        }
    }
    Ok(true)
}

/// Fills `buf` as far as the stream allows. A count short of `buf.len()`
/// means end of stream.
pub(crate) fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, DeltaError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(DeltaError::Io(e)),
        }
    }
    Ok(filled)
}

pub(crate) fn read_u8(reader: &mut impl Read, context: &str) -> Result<u8, DeltaError> {
    let mut buf = [0u8; 1];
    read_exact(reader, &mut buf, context)?;
    Ok(buf[0])
}

pub(crate) fn read_i64(reader: &mut impl Read, context: &str) -> Result<i64, DeltaError> {
    let mut buf = [0u8; 8];
    read_exact(reader, &mut buf, context)?;
    Ok(i64::from_le_bytes(buf))
}

pub(crate) fn read_i32(reader: &mut impl Read, context: &str) -> Result<i32, DeltaError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf, context)?;
    Ok(i32::from_le_bytes(buf))
}

/// Decodes a 7-bit variable-length byte count followed by UTF-8 bytes.
pub(crate) fn read_string(reader: &mut impl Read, context: &str) -> Result<String, DeltaError> {
    let mut len: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = read_u8(reader, context)?;
        len |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 28 {
            return Err(DeltaError::format(format!(
                "string length prefix in {} is malformed",
                context
            )));
        }
    }
    if len > MAX_STRING_LEN {
        return Err(DeltaError::format(format!(
            "string length {} in {} is implausible",
            len, context
        )));
    }
    let mut bytes = vec![0u8; len as usize];
    read_exact(reader, &mut bytes, context)?;
    String::from_utf8(bytes)
        .map_err(|_| DeltaError::format(format!("string in {} is not valid UTF-8", context)))
}

/// Encodes a string with its 7-bit variable-length byte count prefix.
pub(crate) fn encode_string(out: &mut Vec<u8>, value: &str) {
    let mut len = value.len() as u32;
    loop {
        let byte = (len & 0x7f) as u8;
        len >>= 7;
        if len == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out.extend_from_slice(value.as_bytes());
}

/// Reads the version byte and rejects anything but the supported version.
pub(crate) fn read_version(reader: &mut impl Read, context: &str) -> Result<(), DeltaError> {
    let version = read_u8(reader, context)?;
    if version != FORMAT_VERSION {
        return Err(DeltaError::format(format!(
            "unsupported {} version 0x{:02x}",
            context, version
        )));
    }
    Ok(())
}

#[cfg(feature = "async-io")]
pub(crate) mod asynchronous {
    //! Async twins of the sync primitives, over `futures_io` traits.
    //!
    //! These must stay byte-for-byte equivalent to their sync counterparts;
    //! the writers share the `encode_*` functions to guarantee it.

    use futures_io::AsyncRead;
    use futures_util::AsyncReadExt;

    use super::{DeltaError, FORMAT_VERSION, MAX_STRING_LEN, map_eof, truncated};

    pub(crate) async fn read_exact<R: AsyncRead + Unpin>(
        reader: &mut R,
        buf: &mut [u8],
        context: &str,
    ) -> Result<(), DeltaError> {
        reader
            .read_exact(buf)
            .await
            .map_err(|e| map_eof(e, context))
    }

    pub(crate) async fn read_exact_or_eof<R: AsyncRead + Unpin>(
        reader: &mut R,
        buf: &mut [u8],
        context: &str,
    ) -> Result<bool, DeltaError> {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]).await {
                Ok(0) => {
                    if filled == 0 {
                        return Ok(false);
                    }
                    return Err(truncated(context));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(DeltaError::Io(e)),
            }
        }
        Ok(true)
    }

    /// Fills `buf` as far as the stream allows. A count short of `buf.len()`
    /// means end of stream.
    pub(crate) async fn read_full<R: AsyncRead + Unpin>(
        reader: &mut R,
        buf: &mut [u8],
    ) -> Result<usize, DeltaError> {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(DeltaError::Io(e)),
            }
        }
        Ok(filled)
    }

    pub(crate) async fn read_u8<R: AsyncRead + Unpin>(
        reader: &mut R,
        context: &str,
    ) -> Result<u8, DeltaError> {
        let mut buf = [0u8; 1];
        read_exact(reader, &mut buf, context).await?;
        Ok(buf[0])
    }

    pub(crate) async fn read_i64<R: AsyncRead + Unpin>(
        reader: &mut R,
        context: &str,
    ) -> Result<i64, DeltaError> {
        let mut buf = [0u8; 8];
        read_exact(reader, &mut buf, context).await?;
        Ok(i64::from_le_bytes(buf))
    }

    pub(crate) async fn read_i32<R: AsyncRead + Unpin>(
        reader: &mut R,
        context: &str,
    ) -> Result<i32, DeltaError> {
        let mut buf = [0u8; 4];
        read_exact(reader, &mut buf, context).await?;
        Ok(i32::from_le_bytes(buf))
    }

    pub(crate) async fn read_string<R: AsyncRead + Unpin>(
        reader: &mut R,
        context: &str,
    ) -> Result<String, DeltaError> {
        let mut len: u32 = 0;
        let mut shift = 0;
        loop {
            let byte = read_u8(reader, context).await?;
            len |= u32::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 28 {
                return Err(DeltaError::format(format!(
                    "string length prefix in {} is malformed",
                    context
                )));
            }
        }
        if len > MAX_STRING_LEN {
            return Err(DeltaError::format(format!(
                "string length {} in {} is implausible",
                len, context
            )));
        }
        let mut bytes = vec![0u8; len as usize];
        read_exact(reader, &mut bytes, context).await?;
        String::from_utf8(bytes)
            .map_err(|_| DeltaError::format(format!("string in {} is not valid UTF-8", context)))
    }

    pub(crate) async fn read_version<R: AsyncRead + Unpin>(
        reader: &mut R,
        context: &str,
    ) -> Result<(), DeltaError> {
        let version = read_u8(reader, context).await?;
        if version != FORMAT_VERSION {
            return Err(DeltaError::format(format!(
                "unsupported {} version 0x{:02x}",
                context, version
            )));
        }
        Ok(())
    }
}
