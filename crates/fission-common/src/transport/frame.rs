use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::protocol::error::{FissionError, Result};
use crate::protocol::packet::Packet;

/// Size of the length prefix in bytes.
pub const HEADER_SIZE: usize = 4;

/// Maximum frame body size (100 MB).
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Serializes a packet into a complete frame: length header plus body.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(packet)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(FissionError::FrameTooLarge {
            got: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Writes one frame to `writer`.
///
/// The caller must hold exclusive access to the writer for the duration of
/// the call; header and body are written back to back and flushed.
pub async fn write_frame<W>(writer: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_packet(packet)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| FissionError::Transport(format!("writing frame: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| FissionError::Transport(format!("flushing frame: {e}")))?;
    Ok(())
}

/// Writes one frame through a shared writer, holding the lock for the whole
/// header-plus-body write so concurrent writers cannot tear frames.
pub async fn write_frame_locked<W>(writer: &Mutex<W>, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut guard = writer.lock().await;
    write_frame(&mut *guard, packet).await
}

/// Reads one frame from `reader`.
///
/// Returns `Ok(None)` when the stream ends cleanly before the header
/// starts. A stream that ends mid-header or mid-body is reported as a
/// transport error, as is a length prefix above [`MAX_FRAME_SIZE`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Packet>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FissionError::Transport(format!(
                "stream closed after {filled} header bytes"
            )));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FissionError::FrameTooLarge {
            got: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FissionError::Transport(format!("truncated frame body, wanted {len} bytes"))
        } else {
            FissionError::Io(e)
        }
    })?;

    let packet = serde_json::from_slice(&body)?;
    Ok(Some(packet))
}
