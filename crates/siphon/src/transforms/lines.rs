//! 📜 TextLines — one record per line, because sometimes the format really is "text".
//!
//! Also home of [`LineReader`], the newline splitter `JsonLines` borrows. It scans the
//! buffered bytes with `memchr` and refuses to grow a single line past `max_line_bytes`, so a
//! file without a single newline doesn't get to eat the heap.

use std::future::ready;
use std::io;

use futures::stream::{self, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{RecordDecoder, RecordStream, read_error};
use crate::common::{ByteStream, RecordValue};
use crate::error::SiphonError;

/// ✂️ Splits a byte stream on `\n`, dropping the `\n` and any `\r` before it.
pub(crate) struct LineReader {
    reader: BufReader<ByteStream>,
    max_line_bytes: usize,
    done: bool,
}

impl LineReader {
    pub(crate) fn new(stream: ByteStream, max_line_bytes: usize) -> Self {
        Self {
            reader: BufReader::new(stream),
            max_line_bytes,
            done: false,
        }
    }

    /// 📏 The next line, `Ok(None)` at end of stream. The last line needs no trailing newline.
    pub(crate) async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        let mut line = Vec::new();
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                self.done = true;
                if line.is_empty() {
                    return Ok(None);
                }
                break;
            }
            match memchr::memchr(b'\n', available) {
                Some(index) => {
                    line.extend_from_slice(&available[..index]);
                    self.reader.consume(index + 1);
                    break;
                }
                None => {
                    let consumed = available.len();
                    line.extend_from_slice(available);
                    self.reader.consume(consumed);
                }
            }
            if line.len() > self.max_line_bytes {
                self.done = true;
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line exceeds {} bytes without a newline", self.max_line_bytes),
                ));
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.len() > self.max_line_bytes {
            self.done = true;
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line of {} bytes exceeds the {} byte limit", line.len(), self.max_line_bytes),
            ));
        }
        Ok(Some(line))
    }

    /// 🌊 Every non-blank line as a stream. Stops after the first error.
    pub(crate) fn into_stream(self, key: String) -> stream::BoxStream<'static, crate::error::Result<Vec<u8>>> {
        stream::unfold(Some(self), move |state| {
            let key = key.clone();
            async move {
                let mut reader = state?;
                match reader.next_line().await {
                    Ok(Some(line)) => Some((Ok(line), Some(reader))),
                    Ok(None) => None,
                    Err(err) => Some((Err(read_error(&key, err)), None)),
                }
            }
        })
        .filter(|line| ready(!matches!(line, Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace))))
        .boxed()
    }
}

/// 📜 Zero-sized marker: UTF-8 text lines.
pub struct TextLines;

impl RecordDecoder for TextLines {
    fn decode(stream: ByteStream, key: String, max_buffer_size: usize) -> RecordStream {
        let error_key = key.clone();
        LineReader::new(stream, max_buffer_size)
            .into_stream(key)
            .map(move |line| {
                let line = line?;
                String::from_utf8(line)
                    .map(RecordValue::Text)
                    .map_err(|err| SiphonError::Transform {
                        key: error_key.clone(),
                        reason: format!("line is not valid UTF-8: {err}"),
                    })
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Cursor;

    fn stream_of(content: &[u8]) -> ByteStream {
        Box::new(Cursor::new(content.to_vec()))
    }

    #[tokio::test]
    async fn the_one_where_crlf_and_blank_lines_are_tidied() -> anyhow::Result<()> {
        let the_lines: Vec<RecordValue> = TextLines::decode(stream_of(b"alpha\r\n\nbeta\n  \ngamma"), "k".into(), 64)
            .try_collect()
            .await?;
        assert_eq!(
            the_lines,
            vec![
                RecordValue::Text("alpha".into()),
                RecordValue::Text("beta".into()),
                RecordValue::Text("gamma".into()),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_runaway_line_is_stopped_at_the_border() {
        let the_result: crate::error::Result<Vec<RecordValue>> =
            TextLines::decode(stream_of(&[b'x'; 100]), "k".into(), 10).try_collect().await;
        assert!(matches!(the_result, Err(SiphonError::Transform { .. })));
    }

    #[tokio::test]
    async fn the_one_where_invalid_utf8_is_named_and_shamed() {
        let the_result: crate::error::Result<Vec<RecordValue>> =
            TextLines::decode(stream_of(b"ok\n\xff\xfe\n"), "bad.txt".into(), 64).try_collect().await;
        match the_result {
            Err(SiphonError::Transform { key, .. }) => assert_eq!(key, "bad.txt"),
            other => panic!("💀 expected a transform error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_one_where_an_empty_object_has_no_lines() -> anyhow::Result<()> {
        let the_lines: Vec<RecordValue> = TextLines::decode(stream_of(b""), "k".into(), 64).try_collect().await?;
        assert!(the_lines.is_empty());
        Ok(())
    }
}
