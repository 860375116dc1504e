//! 🗜️ GunzipReader — gzip, inflated a slice at a time as the decoder asks for bytes.
//!
//! The compressed side is read in 1 KiB slices and pushed through flate2's write-side
//! decoder, and the decoder's output is handed out before the next slice is read. Nothing waits
//! for the whole object: records before a wire failure still make it out, and one step of
//! inflation is bounded by one slice of input, gzip bombs included.

use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use flate2::write::GzDecoder;
use tokio::io::{AsyncRead, ReadBuf};

use crate::common::ByteStream;

// -- 📏 compressed bytes fed to the decoder per step
const INPUT_SLICE: usize = 1024;

pub(crate) struct GunzipReader {
    inner: ByteStream,
    decoder: GzDecoder<Vec<u8>>,
    input: Box<[u8]>,
    output: Vec<u8>,
    position: usize,
    finished: bool,
}

impl GunzipReader {
    pub(crate) fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            decoder: GzDecoder::new(Vec::new()),
            input: vec![0u8; INPUT_SLICE].into_boxed_slice(),
            output: Vec::new(),
            position: 0,
            finished: false,
        }
    }
}

/// 🩺 Anything the decoder complains about is the object's fault, never the wire's.
fn corrupt(err: io::Error) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("gzip decompression failed: {err}"),
    )
}

impl AsyncRead for GunzipReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.position < this.output.len() {
                let available = buf.remaining().min(this.output.len() - this.position);
                buf.put_slice(&this.output[this.position..this.position + available]);
                this.position += available;
                return Poll::Ready(Ok(()));
            }
            if this.finished {
                return Poll::Ready(Ok(()));
            }

            let mut slice = ReadBuf::new(&mut this.input);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut slice))?;
            let filled = slice.filled().len();
            if filled == 0 {
                this.decoder.try_finish().map_err(corrupt)?;
                this.finished = true;
            } else {
                this.decoder
                    .write_all(&this.input[..filled])
                    .map_err(corrupt)?;
                // -- the decoder holds output back until the next write unless flushed
                this.decoder.flush().map_err(corrupt)?;
            }
            this.output = std::mem::take(this.decoder.get_mut());
            this.position = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Cursor;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn the_one_where_a_big_object_comes_out_byte_for_byte() -> anyhow::Result<()> {
        let the_plain: Vec<u8> = (0..20_000u32).flat_map(|n| format!("{n}\n").into_bytes()).collect();
        let mut the_encoder = GzEncoder::new(Vec::new(), Compression::default());
        the_encoder.write_all(&the_plain)?;
        let the_compressed = the_encoder.finish()?;

        let mut the_reader = GunzipReader::new(Box::new(Cursor::new(the_compressed)));
        let mut the_inflated = Vec::new();
        the_reader.read_to_end(&mut the_inflated).await?;
        assert_eq!(the_inflated, the_plain);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_truncated_member_is_called_out() -> anyhow::Result<()> {
        let mut the_encoder = GzEncoder::new(Vec::new(), Compression::default());
        the_encoder.write_all(b"some text that will be cut short\n")?;
        let mut the_compressed = the_encoder.finish()?;
        the_compressed.truncate(the_compressed.len() - 4);

        let mut the_reader = GunzipReader::new(Box::new(Cursor::new(the_compressed)));
        let the_error = the_reader
            .read_to_end(&mut Vec::new())
            .await
            .err()
            .expect("a missing trailer should not pass as a clean end");
        assert_eq!(the_error.kind(), io::ErrorKind::InvalidData);
        Ok(())
    }
}
