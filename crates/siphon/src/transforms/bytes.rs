//! 🧱 BytesChunks — no parsing, no opinions. The object is cut into chunks of at most
//! `max_buffer_size` bytes and each chunk is a record. The last one may be shorter.

use futures::stream::{self, StreamExt};
use tokio::io::AsyncReadExt;

use super::{RecordDecoder, RecordStream, read_error};
use crate::common::{ByteStream, RecordValue};

/// 🧱 Zero-sized marker: raw byte chunks.
pub struct BytesChunks;

impl RecordDecoder for BytesChunks {
    fn decode(stream: ByteStream, key: String, max_buffer_size: usize) -> RecordStream {
        stream::unfold(Some(stream), move |state| {
            let key = key.clone();
            async move {
                let mut reader = state?;
                let mut chunk = Vec::with_capacity(max_buffer_size);
                match (&mut reader).take(max_buffer_size as u64).read_to_end(&mut chunk).await {
                    Ok(0) => None,
                    Ok(_) => Some((Ok(RecordValue::Bytes(chunk)), Some(reader))),
                    Err(err) => Some((Err(read_error(&key, err)), None)),
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Cursor;

    #[tokio::test]
    async fn the_one_where_ten_bytes_make_three_chunks_of_four() -> anyhow::Result<()> {
        let the_stream: ByteStream = Box::new(Cursor::new(b"0123456789".to_vec()));
        let the_chunks: Vec<RecordValue> = BytesChunks::decode(the_stream, "k".into(), 4).try_collect().await?;
        assert_eq!(
            the_chunks,
            vec![
                RecordValue::Bytes(b"0123".to_vec()),
                RecordValue::Bytes(b"4567".to_vec()),
                RecordValue::Bytes(b"89".to_vec()),
            ]
        );
        Ok(())
    }
}
