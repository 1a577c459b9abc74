//! Incremental decoder for the `event:` / `data:` stream framing.
//!
//! Network chunks are not aligned with frames, lines, or even characters, so
//! the decoder keeps two carry-over buffers: undecoded bytes of a split UTF-8
//! sequence, and the text of the last incomplete line.

use std::collections::VecDeque;

use futures::StreamExt as _;
use futures::stream;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::errors::TransportError;
use crate::event::DecodedEvent;
use crate::transport::ByteStream;

const EVENT_PREFIX: &str = "event:";
const DATA_PREFIX: &str = "data:";

/// Push-based frame decoder. One instance per stream; not restartable.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    undecoded: Vec<u8>,
    line_buf: String,
    pending_event: Option<String>,
    pending_data: Option<String>,
    /// Bytes of `line_buf` already searched for a newline.
    scanned: usize,
    frames: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one transport chunk and returns every frame it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<DecodedEvent> {
        let text = self.decode_utf8(chunk);
        self.line_buf.push_str(&text);

        let mut events = Vec::new();
        while let Some(offset) = self.line_buf[self.scanned..].find('\n') {
            let newline_pos = self.scanned + offset;
            let line: String = self.line_buf.drain(..=newline_pos).collect();
            self.scanned = 0;
            let line = line.trim_end_matches('\n').trim_end_matches('\r');
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        self.scanned = self.line_buf.len();
        events
    }

    /// Number of frames emitted so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.undecoded);
        bytes.extend_from_slice(chunk);

        let mut text = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(invalid_len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[invalid_len..];
                        }
                        // Truncated sequence at the end of the chunk.
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.undecoded = rest.to_vec();
        text
    }

    fn process_line(&mut self, line: &str) -> Option<DecodedEvent> {
        if line.trim().is_empty() {
            return self.close_frame();
        }
        if let Some(value) = line.strip_prefix(EVENT_PREFIX) {
            self.pending_event = non_empty(value);
        } else if let Some(value) = line.strip_prefix(DATA_PREFIX) {
            self.pending_data = non_empty(value);
        } else {
            trace!(
                event = "stream.line_ignored",
                domain = "stream",
                line_len = line.len() as u64
            );
        }
        None
    }

    fn close_frame(&mut self) -> Option<DecodedEvent> {
        if self.pending_event.is_none() || self.pending_data.is_none() {
            return None;
        }
        let event_type = self.pending_event.take()?;
        let data = self.pending_data.take()?;
        match serde_json::from_str(&data) {
            Ok(payload) => {
                self.frames += 1;
                debug!(
                    event = "stream.frame_decoded",
                    domain = "stream",
                    event_type = %event_type,
                    frame = self.frames,
                    data_len = data.len() as u64
                );
                Some(DecodedEvent {
                    event_type,
                    payload,
                })
            }
            Err(err) => {
                warn!(
                    event = "stream.frame_dropped",
                    domain = "stream",
                    event_type = %event_type,
                    error = %err,
                    data_len = data.len() as u64,
                    "dropping frame with invalid JSON payload"
                );
                None
            }
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.trim())
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

/// Turns a byte stream into an ordered stream of decoded events.
///
/// The stream ends when the transport closes, or without error as soon as
/// `abort` reads `true` or its sender is dropped; the byte stream is dropped at
/// that point. A read failure is yielded once and ends the stream.
pub fn decode_events(
    bytes: ByteStream,
    abort: watch::Receiver<bool>,
) -> impl futures::Stream<Item = Result<DecodedEvent, TransportError>> + Send {
    struct State {
        bytes: Option<ByteStream>,
        decoder: FrameDecoder,
        pending: VecDeque<DecodedEvent>,
        abort: watch::Receiver<bool>,
        chunks: u64,
    }

    enum Next {
        Aborted,
        Chunk(Option<Result<bytes::Bytes, TransportError>>),
    }

    stream::try_unfold(
        State {
            bytes: Some(bytes),
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            abort,
            chunks: 0,
        },
        |mut state| async move {
            loop {
                if abort_requested(&state.abort) {
                    if state.bytes.take().is_some() {
                        debug!(
                            event = "stream.cancelled",
                            domain = "stream",
                            chunks = state.chunks,
                            dropped_events = state.pending.len() as u64
                        );
                    }
                    state.pending.clear();
                    return Ok(None);
                }
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                let Some(bytes) = state.bytes.as_mut() else {
                    return Ok(None);
                };

                let next = tokio::select! {
                    biased;
                    _ = aborted(&mut state.abort) => Next::Aborted,
                    chunk = bytes.next() => Next::Chunk(chunk),
                };
                match next {
                    Next::Aborted => continue,
                    Next::Chunk(Some(Ok(chunk))) => {
                        state.chunks += 1;
                        trace!(
                            event = "stream.chunk_received",
                            domain = "stream",
                            chunk = state.chunks,
                            chunk_len = chunk.len() as u64
                        );
                        state.pending.extend(state.decoder.push_chunk(&chunk));
                    }
                    Next::Chunk(Some(Err(err))) => {
                        state.bytes = None;
                        return Err(err);
                    }
                    Next::Chunk(None) => {
                        debug!(
                            event = "stream.closed",
                            domain = "stream",
                            chunks = state.chunks,
                            frames = state.decoder.frames_decoded()
                        );
                        state.bytes = None;
                    }
                }
            }
        },
    )
}

/// Whether the run should stop: the flag is set, or every abort handle is gone
/// and nobody is left to observe the run.
pub(crate) fn abort_requested(abort: &watch::Receiver<bool>) -> bool {
    *abort.borrow() || abort.has_changed().is_err()
}

/// Resolves once the abort flag is set or the last abort handle is dropped.
pub(crate) async fn aborted(abort: &mut watch::Receiver<bool>) {
    let _ = abort.wait_for(|aborted| *aborted).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt as _;
    use serde_json::json;

    const STREAM: &str = concat!(
        "event: status\n",
        "data: {\"step\":1,\"message\":\"Researching Café Ōkami\",\"icon\":\"search\"}\n",
        "\n",
        "event: status\r\n",
        "data: {\"step\":1,\"message\":\"Wave 1 complete — 12 sources\",\"icon\":\"check\",\"elapsed\":8.0}\r\n",
        "\r\n",
        ": keepalive\n",
        "event: complete\n",
        "data: {\"memo\":\"ünïcödé memo ✓\"}\n",
        "\n",
    );

    fn decode_all(chunks: &[&[u8]]) -> Vec<DecodedEvent> {
        let mut decoder = FrameDecoder::new();
        chunks
            .iter()
            .flat_map(|chunk| decoder.push_chunk(chunk))
            .collect()
    }

    #[test]
    fn decodes_whole_stream_in_one_chunk() {
        let events = decode_all(&[STREAM.as_bytes()]);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, "status");
        assert_eq!(events[1].payload["elapsed"], json!(8.0));
        assert_eq!(events[2].payload, json!({"memo": "ünïcödé memo ✓"}));
    }

    #[test]
    fn every_split_offset_yields_same_events() {
        let bytes = STREAM.as_bytes();
        let expected = decode_all(&[bytes]);
        for offset in 0..=bytes.len() {
            let (head, tail) = bytes.split_at(offset);
            assert_eq!(decode_all(&[head, tail]), expected, "split at byte {offset}");
        }
    }

    #[test]
    fn byte_at_a_time_yields_same_events() {
        let bytes = STREAM.as_bytes();
        let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&chunks), decode_all(&[bytes]));
    }

    #[test]
    fn split_multibyte_character_is_buffered() {
        let frame = "event: status\ndata: {\"message\":\"€\"}\n\n".as_bytes();
        let euro_start = frame
            .iter()
            .position(|b| *b == 0xE2)
            .expect("euro sign present");
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push_chunk(&frame[..euro_start + 1]).is_empty());
        assert!(decoder.push_chunk(&frame[euro_start + 1..euro_start + 2]).is_empty());
        let events = decoder.push_chunk(&frame[euro_start + 2..]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["message"], json!("€"));
    }

    #[test]
    fn invalid_json_frame_is_dropped_between_valid_frames() {
        let raw = concat!(
            "event: status\ndata: {\"step\":1}\n\n",
            "event: status\ndata: {not json\n\n",
            "event: status\ndata: {\"step\":2}\n\n",
        );
        let mut decoder = FrameDecoder::new();
        let events = decoder.push_chunk(raw.as_bytes());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload["step"], json!(1));
        assert_eq!(events[1].payload["step"], json!(2));
        assert_eq!(decoder.frames_decoded(), 2);
    }

    #[test]
    fn blank_line_with_incomplete_pair_keeps_pending_state() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push_chunk(b"data: {\"a\":1}\n\n").is_empty());
        let events = decoder.push_chunk(b"event: status\n\n");
        assert_eq!(events, vec![DecodedEvent::new("status", json!({"a": 1}))]);
    }

    #[test]
    fn later_data_line_overwrites_earlier_one() {
        let events = decode_all(&[b"event: x\ndata: 1\ndata: 2\n\n"]);
        assert_eq!(events, vec![DecodedEvent::new("x", json!(2))]);
    }

    #[test]
    fn unterminated_frame_emits_nothing() {
        let events = decode_all(&[b"event: complete\ndata: {\"memo\":\"m\"}\n"]);
        assert!(events.is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let events = decode_all(&[b"event: x\ndata: \"a\xFFb\"\n\n"]);
        assert_eq!(events, vec![DecodedEvent::new("x", json!("a\u{FFFD}b"))]);
    }

    #[test]
    fn long_line_split_into_small_chunks_is_scanned_once() {
        let memo = "x".repeat(4096);
        let wire = format!("event: complete\ndata: {{\"memo\":\"{memo}\"}}\n\n");
        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for chunk in wire.as_bytes().chunks(7) {
            events.extend(decoder.push_chunk(chunk));
            assert_eq!(decoder.scanned, decoder.line_buf.len());
        }
        assert_eq!(events, vec![DecodedEvent::new("complete", json!({"memo": memo}))]);
        assert!(decoder.line_buf.is_empty());
    }

    fn chunks_then_pending(chunks: Vec<&'static str>) -> ByteStream {
        let items = chunks
            .into_iter()
            .map(|c| Ok::<_, TransportError>(bytes::Bytes::from_static(c.as_bytes())));
        Box::pin(stream::iter(items).chain(stream::pending()))
    }

    #[tokio::test]
    async fn stream_ends_when_transport_closes() {
        let (_tx, rx) = watch::channel(false);
        let chunks = vec!["event: status\nda", "ta: {\"step\":1}\n", "\n"];
        let items = chunks
            .into_iter()
            .map(|c| Ok::<_, TransportError>(bytes::Bytes::from_static(c.as_bytes())));
        let events: Vec<_> = decode_events(Box::pin(stream::iter(items)), rx)
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[tokio::test]
    async fn abort_ends_stream_without_error() {
        let (tx, rx) = watch::channel(false);
        let bytes = chunks_then_pending(vec![
            "event: status\ndata: {\"step\":1}\n\nevent: status\ndata: {\"step\":2}\n\n",
        ]);
        let mut events = Box::pin(decode_events(bytes, rx));
        let first = events.next().await.expect("first event").expect("ok");
        assert_eq!(first.payload["step"], json!(1));

        tx.send(true).expect("receiver alive");
        // The second frame was already decoded but must not surface.
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn abort_interrupts_pending_read() {
        let (tx, rx) = watch::channel(false);
        let mut events = Box::pin(decode_events(chunks_then_pending(vec![]), rx));
        let waiter = tokio::spawn(async move { events.next().await.is_none() });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx.send(true).expect("receiver alive");
        assert!(waiter.await.expect("join"));
    }

    #[tokio::test]
    async fn dropped_abort_sender_ends_pending_read() {
        let (tx, rx) = watch::channel(false);
        let mut events = Box::pin(decode_events(chunks_then_pending(vec![]), rx));
        let waiter = tokio::spawn(async move { events.next().await.is_none() });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(tx);
        let ended = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("stream ended after sender drop");
        assert!(ended.expect("join"));
    }

    #[tokio::test]
    async fn read_error_is_terminal() {
        let (_tx, rx) = watch::channel(false);
        let items: Vec<Result<bytes::Bytes, TransportError>> = vec![
            Ok(bytes::Bytes::from_static(b"event: status\ndata: {}\n\n")),
            Err(TransportError::Read("connection reset".into())),
            Ok(bytes::Bytes::from_static(b"event: status\ndata: {}\n\n")),
        ];
        let events: Vec<_> = decode_events(Box::pin(stream::iter(items)), rx)
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert_eq!(
            events[1],
            Err(TransportError::Read("connection reset".into()))
        );
    }
}
