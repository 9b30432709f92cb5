//! Physical line tracking underneath the row decoder.
//!
//! The csv tokenizer never produces a record for a fully blank line, so row numbers
//! taken from it drift after the first blank line. [`PhysicalLines`] watches the bytes
//! on their way into the tokenizer and logs one [`Line`] per physical row, in order.
//! Line breaks inside quoted fields do not end a row.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Line {
    /// Nothing but a line terminator.
    Blank,
    /// A line the tokenizer turns into one record.
    Record,
}

/// Shared, ordered log of the lines seen so far.
#[derive(Debug, Clone, Default)]
pub(crate) struct LineLog(Arc<Mutex<VecDeque<Line>>>);

impl LineLog {
    pub(crate) fn pop(&self) -> Option<Line> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn extend(&self, lines: impl IntoIterator<Item = Line>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(lines);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    LineStart,
    /// Just ended a line on `\r`; a following `\n` belongs to the same terminator.
    AfterCr,
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// An `AsyncRead` pass-through that logs physical lines into a [`LineLog`].
pub(crate) struct PhysicalLines<R> {
    inner: R,
    delimiter: u8,
    state: Scan,
    log: LineLog,
    finished: bool,
}

impl<R> PhysicalLines<R> {
    pub(crate) fn new(inner: R, delimiter: u8, log: LineLog) -> Self {
        Self {
            inner,
            delimiter,
            state: Scan::LineStart,
            log,
            finished: false,
        }
    }

    fn scan(&mut self, bytes: &[u8]) {
        let mut seen = Vec::new();
        for &b in bytes {
            let state = if self.state == Scan::AfterCr {
                if b == b'\n' {
                    self.state = Scan::LineStart;
                    continue;
                }
                Scan::LineStart
            } else {
                self.state
            };

            self.state = match (state, b) {
                (Scan::Quoted, b'"') => Scan::QuoteInQuoted,
                (Scan::Quoted, _) => Scan::Quoted,
                (Scan::LineStart, b'\n') => {
                    seen.push(Line::Blank);
                    Scan::LineStart
                }
                (Scan::LineStart, b'\r') => {
                    seen.push(Line::Blank);
                    Scan::AfterCr
                }
                (_, b'\n') => {
                    seen.push(Line::Record);
                    Scan::LineStart
                }
                (_, b'\r') => {
                    seen.push(Line::Record);
                    Scan::AfterCr
                }
                (Scan::QuoteInQuoted, b'"') => Scan::Quoted,
                (_, b) if b == self.delimiter => Scan::FieldStart,
                (Scan::LineStart | Scan::FieldStart, b'"') => Scan::Quoted,
                _ => Scan::Unquoted,
            };
        }
        self.log.extend(seen);
    }

    fn finish(&mut self) {
        self.finished = true;
        if !matches!(self.state, Scan::LineStart | Scan::AfterCr) {
            self.log.extend([Line::Record]);
        }
        self.state = Scan::LineStart;
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for PhysicalLines<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let fresh = &buf.filled()[before..];
        if !fresh.is_empty() {
            this.scan(fresh);
        } else if !this.finished {
            this.finish();
        }
        Poll::Ready(Ok(()))
    }
}
