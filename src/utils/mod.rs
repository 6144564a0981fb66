//! Small shared I/O helpers

use std::io::{Read, Write};

/// Buffer size for bulk stream copies
pub(crate) const COPY_BUF_SIZE: usize = 80 * 1024;

/// Fill as much of `buf` as the reader can provide; returns bytes read.
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Copy exactly `len` bytes from `reader` to `writer` through an 80 KiB
/// buffer. Errors if the reader ends early.
pub(crate) fn copy_exact<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        let n = reader.read(&mut buf[..want])?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("source ended {remaining} bytes early"),
            ));
        }
        writer.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

/// Copy from `reader` to `writer` until EOF; returns bytes copied.
pub(crate) fn copy_to_end<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<u64> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}
