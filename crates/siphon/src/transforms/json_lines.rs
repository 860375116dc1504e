//! 🧾 JsonLines — one `serde_json::Value` per non-blank line. Newline-delimited JSON, the
//! format every log shipper agrees on and every human breaks with a pretty-printer.

use futures::stream::StreamExt;

use super::lines::LineReader;
use super::{RecordDecoder, RecordStream};
use crate::common::{ByteStream, RecordValue};
use crate::error::SiphonError;

/// 🧾 Zero-sized marker: NDJSON.
pub struct JsonLines;

impl RecordDecoder for JsonLines {
    fn decode(stream: ByteStream, key: String, max_buffer_size: usize) -> RecordStream {
        let error_key = key.clone();
        let mut line_number = 0u64;
        LineReader::new(stream, max_buffer_size)
            .into_stream(key)
            .map(move |line| {
                let line = line?;
                line_number += 1;
                serde_json::from_slice::<serde_json::Value>(&line)
                    .map(RecordValue::Json)
                    .map_err(|err| SiphonError::Transform {
                        key: error_key.clone(),
                        reason: format!("record {line_number} is not valid JSON: {err}"),
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

    #[tokio::test]
    async fn the_one_where_each_line_becomes_a_value() -> anyhow::Result<()> {
        let the_stream: ByteStream = Box::new(Cursor::new(b"{\"id\":1}\n\n[1,2]\n\"bare\"\n".to_vec()));
        let the_values: Vec<RecordValue> = JsonLines::decode(the_stream, "k".into(), 256).try_collect().await?;
        assert_eq!(
            the_values,
            vec![
                RecordValue::Json(serde_json::json!({"id": 1})),
                RecordValue::Json(serde_json::json!([1, 2])),
                RecordValue::Json(serde_json::json!("bare")),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_second_record_is_a_liar() {
        let the_stream: ByteStream = Box::new(Cursor::new(b"{\"id\":1}\n{\"id\":\n{\"id\":3}\n".to_vec()));
        let mut the_values = JsonLines::decode(the_stream, "k".into(), 256);
        assert!(matches!(the_values.next().await, Some(Ok(_))));
        match the_values.next().await {
            Some(Err(SiphonError::Transform { reason, .. })) => assert!(reason.contains("record 2")),
            other => panic!("💀 expected a transform error on record 2, got {other:?}"),
        }
    }
}
