//! The fixed enumeration of read requests a parse computation may issue.
//!
//! A parse computation is an ordinary `async fn` that `.await`s the futures
//! returned by the free functions in this module, normally through the
//! ergonomic wrapper methods on [`TrapIo`](crate::engine::TrapIo) (`io.read(n)`,
//! `io.read_until(delim, true)`, ...). Each future polls directly against the
//! engine's shared buffer; on starvation it records enough state to resume
//! without re-validating its arguments or re-scanning bytes it already ruled
//! out, then returns [`Poll::Pending`]. The engine drives the top-level
//! future with a no-op waker and re-polls exactly when `send`, `send_event`,
//! or `respond`-driven progress makes that worthwhile.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::buffer::BufferError;
use crate::engine::{SharedBuffer, TrapIo};
use crate::error::ParseError;

/// Describes which trap a suspended computation is currently blocked on.
///
/// Purely descriptive — used for diagnostics and tests — since the actual
/// suspension mechanism is the trap future's own `poll` implementation, not
/// a value yielded back to the engine.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Trap {
    /// Waiting for exactly, or at least, `n` bytes (`Read`/`ReadMore`/`Peek`).
    Read {
        /// Minimum bytes required before the trap can resume.
        n: usize,
    },
    /// Waiting for a delimiter to appear.
    ReadUntil {
        /// The delimiter being searched for.
        delim: Vec<u8>,
    },
    /// Waiting for the first external send/event after latching.
    Wait,
    /// Waiting on the external event queue.
    WaitEvent,
}

fn check_positive(n: usize, what: &'static str) -> Result<(), ParseError> {
    if n == 0 {
        Err(ParseError::invalid_argument(format_args!(
            "{what} must be >= 1"
        )))
    } else {
        Ok(())
    }
}

fn check_delim(delim: &[u8]) -> Result<(), ParseError> {
    if delim.is_empty() {
        Err(ParseError::invalid_argument("delimiter must not be empty"))
    } else {
        Ok(())
    }
}

/// `Read(0)` returns all currently readable bytes (never suspends);
/// `Read(n>0)` returns exactly `n` bytes, suspending until they arrive.
pub fn read(buffer: SharedBuffer, n: usize) -> Read {
    Read { buffer, n }
}

/// A future produced by [`read`].
pub struct Read {
    buffer: SharedBuffer,
    n: usize,
}

impl Future for Read {
    type Output = Result<Vec<u8>, ParseError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.buffer.borrow_mut().pull(self.n) {
            Ok(bytes) => Poll::Ready(Ok(bytes)),
            Err(BufferError::Starving(_)) => Poll::Pending,
            Err(other) => Poll::Ready(Err(ParseError::from_overflow(other))),
        }
    }
}

/// `ReadMore(n>=1)` returns all readable bytes, requiring at least `n`.
pub fn read_more(buffer: SharedBuffer, n: usize) -> Result<ReadMore, ParseError> {
    check_positive(n, "n")?;
    Ok(ReadMore { buffer, n })
}

/// A future produced by [`read_more`].
pub struct ReadMore {
    buffer: SharedBuffer,
    n: usize,
}

impl Future for ReadMore {
    type Output = Result<Vec<u8>, ParseError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.buffer.borrow_mut().pull_amap(self.n) {
            Ok(bytes) => Poll::Ready(Ok(bytes)),
            Err(BufferError::Starving(_)) => Poll::Pending,
            Err(other) => Poll::Ready(Err(ParseError::from_overflow(other))),
        }
    }
}

/// `ReadUntil(delim, keep_tail)` returns bytes up to, and optionally
/// including, `delim`.
pub fn read_until(buffer: SharedBuffer, delim: Vec<u8>, keep_tail: bool) -> Result<ReadUntil, ParseError> {
    check_delim(&delim)?;
    Ok(ReadUntil {
        buffer,
        delim,
        keep_tail,
        pos: None,
    })
}

/// A future produced by [`read_until`].
pub struct ReadUntil {
    buffer: SharedBuffer,
    delim: Vec<u8>,
    keep_tail: bool,
    pos: Option<usize>,
}

impl Future for ReadUntil {
    type Output = Result<Vec<u8>, ParseError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = this
            .buffer
            .borrow_mut()
            .pull_until(&this.delim, this.pos, this.keep_tail);
        match result {
            Ok(bytes) => Poll::Ready(Ok(bytes)),
            Err(BufferError::Starving(resume)) => {
                this.pos = resume;
                Poll::Pending
            }
            Err(other) => Poll::Ready(Err(ParseError::from_overflow(other))),
        }
    }
}

/// `ReadStruct` reads a fixed-size array of exactly `N` bytes; descriptors
/// built on top decode the array's fields (there is no runtime format
/// string in a statically typed language).
pub fn read_struct<const N: usize>(buffer: SharedBuffer) -> ReadStruct<N> {
    ReadStruct { buffer }
}

/// A future produced by [`read_struct`].
pub struct ReadStruct<const N: usize> {
    buffer: SharedBuffer,
}

impl<const N: usize> Future for ReadStruct<N> {
    type Output = Result<[u8; N], ParseError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.buffer.borrow_mut().pull_array::<N>() {
            Ok(bytes) => Poll::Ready(Ok(bytes)),
            Err(BufferError::Starving(_)) => Poll::Pending,
            Err(other) => Poll::Ready(Err(ParseError::from_overflow(other))),
        }
    }
}

/// `ReadInt(n, byteorder, signed)` decodes an `n`-byte integer.
pub fn read_int(
    buffer: SharedBuffer,
    n: usize,
    big_endian: bool,
    signed: bool,
) -> Result<ReadInt, ParseError> {
    check_positive(n, "n")?;
    if n > 16 {
        return Err(ParseError::invalid_argument(
            "integers wider than 16 bytes are not supported",
        ));
    }
    Ok(ReadInt {
        buffer,
        n,
        big_endian,
        signed,
    })
}

/// A future produced by [`read_int`].
pub struct ReadInt {
    buffer: SharedBuffer,
    n: usize,
    big_endian: bool,
    signed: bool,
}

impl Future for ReadInt {
    type Output = Result<i128, ParseError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self
            .buffer
            .borrow_mut()
            .pull_int(self.n, self.big_endian, self.signed)
        {
            Ok(value) => Poll::Ready(Ok(value)),
            Err(BufferError::Starving(_)) => Poll::Pending,
            Err(other) => Poll::Ready(Err(ParseError::from_overflow(other))),
        }
    }
}

/// `Peek(n>=1)` returns the first `n` bytes without consuming them.
pub fn peek(buffer: SharedBuffer, n: usize) -> Result<Peek, ParseError> {
    check_positive(n, "n")?;
    Ok(Peek { buffer, n })
}

/// A future produced by [`peek`].
pub struct Peek {
    buffer: SharedBuffer,
    n: usize,
}

impl Future for Peek {
    type Output = Result<Vec<u8>, ParseError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.buffer.borrow().peek(self.n) {
            Ok(bytes) => Poll::Ready(Ok(bytes)),
            Err(BufferError::Starving(_)) => Poll::Pending,
            Err(other) => Poll::Ready(Err(ParseError::from_overflow(other))),
        }
    }
}

/// `Wait` latches: the first poll forces one suspension regardless of
/// buffer state, so the computation observes at least one external
/// `send`/`send_event` before resuming. The latch lives on this future, not
/// on the parser, so nested/reentrant waits never share state.
pub fn wait() -> Wait {
    Wait { latched: false }
}

/// A future produced by [`wait`].
pub struct Wait {
    latched: bool,
}

impl Future for Wait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if !this.latched {
            this.latched = true;
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}

/// `WaitEvent` returns the next queued external event, suspending while the
/// queue is empty.
pub fn wait_event<T, Ev>(io: TrapIo<T, Ev>) -> WaitEvent<T, Ev> {
    WaitEvent { io }
}

/// A future produced by [`wait_event`].
pub struct WaitEvent<T, Ev> {
    io: TrapIo<T, Ev>,
}

impl<T, Ev> Future for WaitEvent<T, Ev> {
    type Output = Ev;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.io.pop_event() {
            Some(event) => Poll::Ready(event),
            None => Poll::Pending,
        }
    }
}

/// `GetParser` returns the parser handle, never suspending.
pub fn get_parser<T, Ev>(io: TrapIo<T, Ev>) -> GetParser<T, Ev> {
    GetParser { io: Some(io) }
}

/// A future produced by [`get_parser`].
pub struct GetParser<T, Ev> {
    io: Option<TrapIo<T, Ev>>,
}

impl<T, Ev> Future for GetParser<T, Ev> {
    type Output = TrapIo<T, Ev>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Poll::Ready(this.io.take().expect("GetParser polled after completion"))
    }
}
