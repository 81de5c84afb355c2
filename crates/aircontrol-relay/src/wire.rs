//! Wire format: one JSON object per `\n`-terminated line.
//!
//! Both the relay and the direct-connect host speak this framing.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::RelayError;

/// Maximum line size (64 KiB). Longer lines end the connection.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Encode a message as a JSON line.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<Vec<u8>, RelayError> {
    let mut line = serde_json::to_vec(msg)?;
    line.push(b'\n');
    Ok(line)
}

/// Read the next non-empty line. `Ok(None)` on a clean end of stream.
pub async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<Option<String>, RelayError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        buf.clear();
        let limit = u64::try_from(MAX_LINE_LEN + 1).unwrap_or(u64::MAX);
        let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() != Some(&b'\n') && n > MAX_LINE_LEN {
            return Err(RelayError::FrameTooLarge(n));
        }

        let line = String::from_utf8_lossy(buf);
        let line = line.trim();
        if !line.is_empty() {
            trace!(len = line.len(), "read line");
            return Ok(Some(line.to_string()));
        }
    }
}

/// Drain `rx` onto `writer` until every sender is gone or a write fails,
/// then shut the write side down.
pub async fn write_lines<T, W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<T>)
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        let line = match encode_line(&msg) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "dropping unencodable frame");
                continue;
            }
        };
        if let Err(e) = writer.write_all(&line).await {
            debug!(error = %e, "write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
