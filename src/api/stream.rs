// Server-sent-event decoding for streamed chat completions

use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::error::JobError;

/// Marks the end of a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, JobError>> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, JobError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// An incremental content fragment.
    Delta(String),
    Done,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkContent>,
    #[serde(default)]
    message: Option<ChunkContent>,
}

#[derive(Debug, Deserialize)]
struct ChunkContent {
    #[serde(default)]
    content: Option<String>,
}

impl ChatChunk {
    fn into_content(self) -> Option<String> {
        let choice = self.choices.into_iter().next()?;
        choice
            .delta
            .and_then(|d| d.content)
            .or_else(|| choice.message.and_then(|m| m.content))
    }
}

/// Decode one line of the event stream, or `None` to skip it.
///
/// Only `data:` lines matter. Blank lines, comments, other fields, chunks
/// without content and malformed JSON are all skipped; a bad line never ends
/// the stream.
pub fn parse_sse_line(line: &str) -> Option<SseFrame> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data == DONE_SENTINEL {
        return Some(SseFrame::Done);
    }

    let chunk = match serde_json::from_str::<ChatChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!("skipping malformed stream chunk: {e}");
            return None;
        }
    };

    chunk
        .into_content()
        .filter(|content| !content.is_empty())
        .map(SseFrame::Delta)
}

/// Split a byte stream into lines, buffering partial lines across chunks.
///
/// Splitting happens on raw bytes so a multi-byte character spanning two
/// chunks is never cut. A trailing line without a newline is still yielded.
pub fn lines<S, E>(byte_stream: S) -> LineStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let stream = futures::stream::unfold(
        (Box::pin(byte_stream), Vec::new(), false),
        |(mut byte_stream, mut buffer, mut finished)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let rest = buffer.split_off(pos + 1);
                    let line = std::mem::replace(&mut buffer, rest);
                    let text = String::from_utf8_lossy(&line)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    return Some((Ok(text), (byte_stream, buffer, finished)));
                }

                if finished {
                    if buffer.is_empty() {
                        return None;
                    }
                    let text = String::from_utf8_lossy(&buffer).trim_end().to_string();
                    buffer.clear();
                    return Some((Ok(text), (byte_stream, buffer, finished)));
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        buffer.clear();
                        finished = true;
                        let err = JobError::request(None, format!("Stream error: {e}"));
                        return Some((Err(err), (byte_stream, buffer, finished)));
                    }
                    None => finished = true,
                }
            }
        },
    );

    Box::pin(stream)
}

/// Lines decoded into frames, skipping every line that yields nothing.
pub fn sse_frames<S, E>(byte_stream: S) -> FrameStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let frames = lines(byte_stream).filter_map(|line| async move {
        match line {
            Ok(line) => parse_sse_line(&line).map(Ok),
            Err(e) => Some(Err(e)),
        }
    });

    Box::pin(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn chunked(parts: &[&str]) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
        let owned: Vec<Result<Bytes, io::Error>> = parts
            .iter()
            .map(|part| Ok(Bytes::from(part.to_string())))
            .collect();
        futures::stream::iter(owned)
    }

    async fn collect_frames(parts: &[&str]) -> Vec<SseFrame> {
        sse_frames(chunked(parts))
            .map(|frame| frame.unwrap())
            .collect()
            .await
    }

    #[test]
    fn test_parse_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(line), Some(SseFrame::Delta("Hel".to_string())));
    }

    #[test]
    fn test_parse_without_space_after_colon() {
        let line = r#"data:{"choices":[{"delta":{"content":"x"}}]}"#;
        assert_eq!(parse_sse_line(line), Some(SseFrame::Delta("x".to_string())));
    }

    #[test]
    fn test_parse_sentinel() {
        assert_eq!(parse_sse_line("data: [DONE]"), Some(SseFrame::Done));
        assert_eq!(parse_sse_line("data:[DONE]\r"), Some(SseFrame::Done));
    }

    #[test]
    fn test_parse_message_content_fallback() {
        let line = r#"data: {"choices":[{"message":{"content":"whole"}}]}"#;
        assert_eq!(parse_sse_line(line), Some(SseFrame::Delta("whole".to_string())));
    }

    #[test]
    fn test_parse_skips_noise() {
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("event: message"), None);
        assert_eq!(parse_sse_line("data: {not json"), None);
        assert_eq!(parse_sse_line(r#"data: {"choices":[]}"#), None);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            None
        );
    }

    #[tokio::test]
    async fn test_lines_across_chunk_boundaries() {
        let collected: Vec<String> = lines(chunked(&["one\r\ntw", "o\n", "\nthree"]))
            .map(|line| line.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec!["one", "two", "", "three"]);
    }

    #[tokio::test]
    async fn test_lines_keep_split_multibyte_characters() {
        let fox = "狐".as_bytes();
        let parts: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::copy_from_slice(&fox[..1])),
            Ok(Bytes::copy_from_slice(&fox[1..])),
            Ok(Bytes::from_static(b"\n")),
        ];
        let collected: Vec<String> = lines(futures::stream::iter(parts))
            .map(|line| line.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec!["狐"]);
    }

    #[tokio::test]
    async fn test_frames_skip_bad_chunks() {
        let frames = collect_frames(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {broken\n\n",
            "data: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"lo\"}}]}\n\ndata: [DONE]\n\n",
        ])
        .await;
        assert_eq!(
            frames,
            vec![
                SseFrame::Delta("Hel".to_string()),
                SseFrame::Delta("lo".to_string()),
                SseFrame::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_once() {
        let parts: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n")),
            Err(io::Error::other("connection reset")),
        ];
        let items: Vec<Result<SseFrame, JobError>> =
            sse_frames(futures::stream::iter(parts)).collect().await;

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Ok(SseFrame::Delta(d)) if d == "a"));
        assert!(matches!(&items[1], Err(JobError::Request { .. })));
    }
}
