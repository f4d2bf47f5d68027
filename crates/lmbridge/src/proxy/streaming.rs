//! SSE stream driving
//!
//! This module connects the backend byte stream to a [`StreamTranslator`]:
//! - [`SseLineStream`] splits raw chunks into lines
//! - [`TranslatedStream`] feeds those lines through the translator and
//!   yields encoded Messages API frames
//!
//! Both are pull-based. Nothing is read from the backend until the client
//! side asks for the next frame, and dropping the outer stream drops the
//! backend response with it.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;

use crate::protocol::StreamEvent;
use crate::translate::{StreamTranslator, TranslateError, encode_frame};

/// Longest line accepted before the backend is considered broken
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a byte stream into `\n` or `\r\n` terminated lines
pub struct SseLineStream<S> {
    inner: S,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to contain no newline
    scanned: usize,
    max_line_bytes: usize,
    exhausted: bool,
}

impl<S> SseLineStream<S> {
    pub fn new(inner: S) -> Self {
        Self::with_max_line_bytes(inner, MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(inner: S, max_line_bytes: usize) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            scanned: 0,
            max_line_bytes,
            exhausted: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') else {
            self.scanned = self.buffer.len();
            return None;
        };
        let newline = self.scanned + offset;
        self.scanned = 0;

        let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

impl<S, E> Stream for SseLineStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<String, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(line) = this.take_line() {
                return Poll::Ready(Some(Ok(line)));
            }

            if this.exhausted {
                return Poll::Ready(this.take_remainder().map(Ok));
            }

            if this.buffer.len() > this.max_line_bytes {
                tracing::warn!(
                    pending_bytes = this.buffer.len(),
                    limit = this.max_line_bytes,
                    "Backend line exceeds limit, ending stream"
                );
                this.buffer.clear();
                this.scanned = 0;
                this.exhausted = true;
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => this.exhausted = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Backend SSE body translated into Messages API frames
pub struct TranslatedStream<S> {
    lines: Option<SseLineStream<S>>,
    translator: StreamTranslator,
    pending: VecDeque<StreamEvent>,
}

impl<S> TranslatedStream<S> {
    /// Open the translator and queue the envelope frames
    pub fn new(inner: S, mut translator: StreamTranslator) -> Result<Self, TranslateError> {
        let opening = translator.open()?;

        Ok(Self {
            lines: Some(SseLineStream::new(inner)),
            translator,
            pending: opening.into_iter().collect(),
        })
    }

    /// Stop reading from the backend and close the translator
    fn finish(&mut self) {
        if self.lines.take().is_none() {
            return;
        }

        match self.translator.close() {
            Ok(Some(event)) => self.pending.push_back(event),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to close stream translator"),
        }

        tracing::debug!(
            deltas = self.translator.deltas(),
            malformed_fragments = self.translator.malformed_fragments(),
            "Stream finished"
        );
    }
}

impl<S, E> Stream for TranslatedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(event) = this.pending.pop_front() {
                let frame = encode_frame(&event).map_err(|e| std::io::Error::other(e.to_string()));
                return Poll::Ready(Some(frame));
            }

            let Some(lines) = this.lines.as_mut() else {
                return Poll::Ready(None);
            };

            match Pin::new(lines).poll_next(cx) {
                Poll::Ready(Some(Ok(line))) => match this.translator.feed(&line) {
                    Ok(Some(StreamEvent::MessageStop)) => {
                        this.pending.push_back(StreamEvent::MessageStop);
                        this.finish();
                    }
                    Ok(Some(event)) => this.pending.push_back(event),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Stream translator rejected line");
                        this.finish();
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Backend stream failed mid-response");
                    this.finish();
                }
                Poll::Ready(None) => this.finish(),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
