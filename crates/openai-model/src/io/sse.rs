use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
pub struct Sse {
    // Bytes of an incomplete UTF-8 sequence split across two chunks.
    raw: Vec<u8>,
    buf: String,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            raw: Vec::new(),
            buf: String::new(),
            chunks,
        }
    }

    /// Returns the data of the next event, or `None` at the end of stream.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // There may be complete events buffered from the last read.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.raw.extend_from_slice(bytes);
        let mut valid_len = match str::from_utf8(&self.raw) {
            Ok(s) => s.len(),
            // The tail is an incomplete sequence, keep it for the next chunk.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        // A trailing `\r` may be the first half of a CRLF.
        if valid_len > 0 && self.raw[valid_len - 1] == b'\r' {
            valid_len -= 1;
        }
        let Ok(s) = str::from_utf8(&self.raw[..valid_len]) else {
            return Err(Error::InvalidPayload);
        };
        if s.contains('\r') {
            self.buf.push_str(&s.replace("\r\n", "\n"));
        } else {
            self.buf.push_str(s);
        }
        self.raw.drain(..valid_len);
        Ok(())
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // For `end-of-line`, we only handle line feed (CRLF is normalized
        // when buffering). Comments are skipped, and blocks that carry no
        // `data` field are not reported as events.
        //
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        loop {
            let Some(eol_idx) = self.buf.find("\n\n") else {
                return Ok(None);
            };
            let block: String = self.buf.drain(0..eol_idx + 2).collect();

            let mut data_lines = Vec::new();
            for line in block.lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (name, value) = match line.split_once(':') {
                    Some((name, value)) => {
                        (name, value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line, ""),
                };
                match name {
                    "data" => data_lines.push(value),
                    "event" | "id" | "retry" => {}
                    _ => return Err(Error::InvalidPayload),
                }
            }

            if !data_lines.is_empty() {
                return Ok(Some(data_lines.join("\n")));
            }
        }
    }
}
