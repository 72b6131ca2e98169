//! Log stream framing
//!
//! Non-TTY service logs arrive multiplexed: every frame starts with an 8 byte
//! header (stream kind, three zero bytes, big-endian payload length). Frames
//! may be split across chunks in any way. Streams whose first bytes are not a
//! frame header are passed through as they are.

use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::cluster::LogStream;
use crate::errors::DeployerError;

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Detect,
    Multiplexed,
    Raw,
}

struct Demuxer {
    inner: BoxStream<'static, Result<Bytes, DeployerError>>,
    buf: BytesMut,
    mode: Mode,
    finished: bool,
}

fn is_header(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_LEN && bytes[0] <= 2 && bytes[1..4] == [0, 0, 0]
}

impl Demuxer {
    fn next_payload(&mut self) -> Option<Bytes> {
        if self.mode == Mode::Detect {
            if self.buf.len() >= HEADER_LEN {
                self.mode = if is_header(&self.buf) {
                    Mode::Multiplexed
                } else {
                    Mode::Raw
                };
            } else if self.finished {
                self.mode = Mode::Raw;
            } else {
                return None;
            }
        }

        match self.mode {
            Mode::Raw | Mode::Detect => {
                if self.buf.is_empty() {
                    None
                } else {
                    Some(self.buf.split().freeze())
                }
            }
            Mode::Multiplexed => {
                if self.buf.len() < HEADER_LEN {
                    return None;
                }
                let len = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]])
                    as usize;
                if self.buf.len() < HEADER_LEN + len {
                    return None;
                }
                self.buf.advance(HEADER_LEN);
                Some(self.buf.split_to(len).freeze())
            }
        }
    }
}

/// Strip stream framing from a chunked log stream
pub fn demux<S>(inner: S) -> LogStream
where
    S: Stream<Item = Result<Bytes, DeployerError>> + Send + 'static,
{
    let state = Demuxer {
        inner: inner.boxed(),
        buf: BytesMut::new(),
        mode: Mode::Detect,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.next_payload() {
                if payload.is_empty() {
                    continue;
                }
                return Some((Ok(payload), state));
            }

            if state.finished {
                // trailing bytes of a truncated frame
                if state.buf.is_empty() {
                    return None;
                }
                let rest = state.buf.split().freeze();
                return Some((Ok(rest), state));
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => state.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}
