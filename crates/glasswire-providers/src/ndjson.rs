//! Newline-delimited JSON stream parser.
//!
//! Turns a byte stream into a stream of typed records, one per line.
//! Lines that do not parse as `T` are skipped, never surfaced as errors.

use std::fmt::Display;

use bytes::Bytes;
use futures::Stream;
use serde::de::DeserializeOwned;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::BackendError;

/// Parse a byte stream as NDJSON records of type `T`.
pub fn parse_ndjson_stream<S, E, T>(byte_stream: S) -> impl Stream<Item = Result<T, BackendError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
    T: DeserializeOwned,
{
    futures::stream::unfold(
        NdjsonState {
            byte_stream: Box::pin(byte_stream),
            buffer: Vec::new(),
            finished: false,
        },
        |mut state| async move {
            loop {
                // Emit complete lines first; bytes are split only on '\n' so
                // multi-byte characters straddling chunks survive.
                if let Some(newline_pos) = state.buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = state.buffer.drain(..=newline_pos).collect();
                    if let Some(record) = decode_line(&line[..line.len() - 1]) {
                        return Some((Ok(record), state));
                    }
                    continue;
                }

                if state.finished {
                    // Trailing line without newline.
                    let rest = std::mem::take(&mut state.buffer);
                    return decode_line(&rest).map(|record| (Ok(record), state));
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        state.finished = true;
                        state.buffer.clear();
                        return Some((Err(BackendError::Stream(e.to_string())), state));
                    }
                    None => state.finished = true,
                }
            }
        },
    )
}

fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Option<T> {
    let line = trim_ascii(line);
    if line.is_empty() {
        return None;
    }
    match serde_json::from_slice(line) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(%e, line = %String::from_utf8_lossy(line), "Skipping malformed NDJSON line");
            None
        }
    }
}

fn trim_ascii(mut line: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = line {
        if first.is_ascii_whitespace() {
            line = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = line {
        if last.is_ascii_whitespace() {
            line = rest;
        } else {
            break;
        }
    }
    line
}

struct NdjsonState<E> {
    byte_stream: std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>,
    buffer: Vec<u8>,
    finished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Rec {
        n: u32,
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, String>> + Send + 'static {
        let items: Vec<Result<Bytes, String>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        futures::stream::iter(items)
    }

    async fn collect(parts: &[&'static str]) -> Vec<Result<Rec, BackendError>> {
        parse_ndjson_stream::<_, _, Rec>(chunks(parts)).collect().await
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let out = collect(&["{\"n\":1}\n{\"n\"", ":2}\n{\"n\":3}"]).await;
        let values: Vec<u32> = out.into_iter().map(|r| r.unwrap().n).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let out = collect(&["{\"n\":1}\r\nnot json\n\n{\"oops\":true}\n{\"n\":2}\n"]).await;
        let values: Vec<u32> = out.into_iter().map(|r| r.unwrap().n).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_transport_error_is_reported_once() {
        let items: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"{\"n\":1}\n")),
            Err("connection reset".into()),
            Ok(Bytes::from_static(b"{\"n\":2}\n")),
        ];
        let out: Vec<Result<Rec, BackendError>> =
            parse_ndjson_stream(futures::stream::iter(items)).collect().await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap().n, 1);
        assert!(matches!(out[1], Err(BackendError::Stream(_))));
    }
}
