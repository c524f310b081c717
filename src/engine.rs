//! Drives a suspendable parse computation: dispatches traps against the
//! buffer, manages output events, and exposes the terminal result.
//!
//! A parse computation is passed to [`Parser::new`] as a closure taking a
//! [`TrapIo`] handle and returning a `Future`; the engine boxes and pins
//! that future and repeatedly polls it with a no-op [`Waker`] — there is
//! never a second party to wake it, so the engine simply re-polls whenever
//! `send`, `send_event`, or a `respond` call might have made progress
//! possible.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use crate::buffer::{Buffer, BufferConfig};
use crate::error::{NoResult, ParseError};
use crate::trap;

/// A parser's shared, reference-counted buffer handle.
///
/// Exposed so that free trap-producer functions in [`crate::trap`] and
/// descriptors in [`crate::schema`] can be built directly from it without
/// depending on the full generic [`TrapIo`] type.
pub type SharedBuffer = Rc<RefCell<Buffer>>;

/// Configuration passed to [`Parser::with_config`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub struct EngineConfig {
    buffer: BufferConfig,
}

impl EngineConfig {
    /// Build a config with the given buffer capacity.
    pub const fn with_buffer_capacity(capacity: usize) -> Self {
        Self {
            buffer: BufferConfig::with_capacity(capacity),
        }
    }

    /// The underlying [`BufferConfig`].
    pub const fn buffer_config(&self) -> BufferConfig {
        self.buffer
    }
}

/// Lifecycle state of a [`Parser`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LifecycleState {
    /// Suspended on a trap that needs more input.
    Waiting,
    /// Currently stepping the computation.
    Advancing,
    /// The computation has returned or errored; no further progress.
    Ended,
}

/// One entry in a parser's output queue.
///
/// The four optional fields mirror `respond(bytes_to_send?, close?, error?,
/// result?)`: a single call can set any combination of them (a final chunk
/// of bytes alongside the terminal result, for instance).
#[derive(Debug, Default)]
pub struct OutputEvent<T> {
    /// Bytes the host should write to its sink.
    pub bytes_to_send: Option<Vec<u8>>,
    /// Whether the host should close the connection after this event.
    pub should_close: bool,
    /// A fatal error the host should surface (and re-raise, per `run`).
    pub error: Option<ParseError>,
    /// The computation's terminal result, if this event carries one.
    pub result: Option<T>,
}

impl<T> OutputEvent<T> {
    /// An event carrying only bytes to send.
    pub fn send(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes_to_send: Some(bytes.into()),
            ..Self::empty()
        }
    }

    /// An event asking the host to close the connection.
    pub fn close() -> Self {
        Self {
            should_close: true,
            ..Self::empty()
        }
    }

    /// An event carrying a fatal error.
    pub fn error(error: ParseError) -> Self {
        Self {
            error: Some(error),
            ..Self::empty()
        }
    }

    /// An event carrying the terminal result.
    pub fn result(value: T) -> Self {
        Self {
            result: Some(value),
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            bytes_to_send: None,
            should_close: false,
            error: None,
            result: None,
        }
    }

    /// Whether this event carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.bytes_to_send.is_none() && !self.should_close && self.error.is_none() && self.result.is_none()
    }
}

/// The shared handle threaded explicitly through a parse computation.
///
/// `TrapIo` is cheap to clone (it is a handful of `Rc`s) and is not
/// thread-safe, matching the single-threaded sharing model of one
/// [`Parser`]. `Ev` is the type of out-of-band events delivered through
/// [`send_event`](Parser::send_event); it defaults to `()` for computations
/// that never use `WaitEvent`.
pub struct TrapIo<T = (), Ev = ()> {
    buffer: SharedBuffer,
    outputs: Rc<RefCell<VecDeque<OutputEvent<T>>>>,
    events: Rc<RefCell<VecDeque<Ev>>>,
    has_result: Rc<Cell<bool>>,
}

impl<T, Ev> Clone for TrapIo<T, Ev> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            outputs: self.outputs.clone(),
            events: self.events.clone(),
            has_result: self.has_result.clone(),
        }
    }
}

impl<T, Ev> TrapIo<T, Ev> {
    fn buffer_handle(&self) -> SharedBuffer {
        self.buffer.clone()
    }

    /// `Read(0)` / `Read(n)`.
    pub fn read(&self, n: usize) -> trap::Read {
        trap::read(self.buffer_handle(), n)
    }

    /// `ReadMore(n)`.
    pub fn read_more(&self, n: usize) -> Result<trap::ReadMore, ParseError> {
        trap::read_more(self.buffer_handle(), n)
    }

    /// `ReadUntil(delim, keep_tail)`.
    pub fn read_until(
        &self,
        delim: impl Into<Vec<u8>>,
        keep_tail: bool,
    ) -> Result<trap::ReadUntil, ParseError> {
        trap::read_until(self.buffer_handle(), delim.into(), keep_tail)
    }

    /// `ReadStruct`, reading a fixed-size array of exactly `N` bytes.
    pub fn read_struct<const N: usize>(&self) -> trap::ReadStruct<N> {
        trap::read_struct(self.buffer_handle())
    }

    /// `ReadInt(n, byteorder, signed)`.
    pub fn read_int(&self, n: usize, big_endian: bool, signed: bool) -> Result<trap::ReadInt, ParseError> {
        trap::read_int(self.buffer_handle(), n, big_endian, signed)
    }

    /// `Peek(n)`.
    pub fn peek(&self, n: usize) -> Result<trap::Peek, ParseError> {
        trap::peek(self.buffer_handle(), n)
    }

    /// `Wait`.
    pub fn wait(&self) -> trap::Wait {
        trap::wait()
    }

    /// `WaitEvent`.
    pub fn wait_event(&self) -> trap::WaitEvent<T, Ev> {
        trap::wait_event(self.clone())
    }

    /// `GetParser`.
    pub fn get_parser(&self) -> trap::GetParser<T, Ev> {
        trap::get_parser(self.clone())
    }

    /// Enqueue an output event. Called by the computation to hand bytes,
    /// a close request, an error, or the terminal result back to the host.
    pub fn respond(&self, event: OutputEvent<T>) {
        if event.result.is_some() {
            self.has_result.set(true);
        }
        self.outputs.borrow_mut().push_back(event);
    }

    /// Convenience over [`respond`](Self::respond) for a bytes-only event.
    pub fn respond_bytes(&self, bytes: impl Into<Vec<u8>>) {
        self.respond(OutputEvent::send(bytes));
    }

    pub(crate) fn pop_event(&self) -> Option<Ev> {
        self.events.borrow_mut().pop_front()
    }
}

fn noop_raw_waker() -> RawWaker {
    fn no_op(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
    RawWaker::new(std::ptr::null(), &VTABLE)
}

fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(noop_raw_waker()) }
}

/// Poll a future exactly once with the engine's no-op waker.
///
/// Used by nested, already-fully-buffered parse computations (length
/// prefixed objects and object lists) that must never truly suspend: if one
/// polls to `Pending` it means the nested payload was malformed, not that
/// more bytes are coming.
pub(crate) fn poll_once<F: Future + ?Sized>(future: Pin<&mut F>) -> Poll<F::Output> {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    future.poll(&mut cx)
}

/// Drives one parse computation to completion, one trap at a time.
pub struct Parser<T, Ev = ()> {
    future: Pin<Box<dyn Future<Output = T>>>,
    io: TrapIo<T, Ev>,
    state: LifecycleState,
}

impl<T: 'static, Ev: 'static> Parser<T, Ev> {
    /// Attach a parse computation, using the default buffer configuration.
    ///
    /// Immediately runs the engine until the first suspension or
    /// termination, so the computation registers its first trap before any
    /// input arrives.
    pub fn new<F, Fut>(make_computation: F) -> Self
    where
        F: FnOnce(TrapIo<T, Ev>) -> Fut,
        Fut: Future<Output = T> + 'static,
    {
        Self::with_config(EngineConfig::default(), make_computation)
    }

    /// Attach a parse computation with an explicit [`EngineConfig`].
    pub fn with_config<F, Fut>(config: EngineConfig, make_computation: F) -> Self
    where
        F: FnOnce(TrapIo<T, Ev>) -> Fut,
        Fut: Future<Output = T> + 'static,
    {
        let io = TrapIo {
            buffer: Rc::new(RefCell::new(Buffer::with_config(config.buffer_config()))),
            outputs: Rc::new(RefCell::new(VecDeque::new())),
            events: Rc::new(RefCell::new(VecDeque::new())),
            has_result: Rc::new(Cell::new(false)),
        };
        let future = Box::pin(make_computation(io.clone()));
        let mut parser = Self {
            future,
            io,
            state: LifecycleState::Advancing,
        };
        parser.run();
        parser
    }

    fn run(&mut self) {
        if self.state == LifecycleState::Ended {
            return;
        }
        self.state = LifecycleState::Advancing;
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        log::trace!("engine: polling parse computation");
        match self.future.as_mut().poll(&mut cx) {
            Poll::Ready(value) => {
                log::debug!("engine: parse computation completed");
                self.state = LifecycleState::Ended;
                self.io.respond(OutputEvent::result(value));
            }
            Poll::Pending => {
                log::trace!("engine: suspended, awaiting more input");
                self.state = LifecycleState::Waiting;
            }
        }
    }

    /// The current [`LifecycleState`].
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Append `data` to the buffer and run. `data` may be empty, e.g. to
    /// kick progress after a `send_event`.
    pub fn send(&mut self, data: &[u8]) -> Result<(), ParseError> {
        if !data.is_empty() {
            self.io
                .buffer
                .borrow_mut()
                .push(data)
                .map_err(ParseError::from_overflow)?;
        }
        self.run();
        Ok(())
    }

    /// Enqueue an external event, consumed by a pending `WaitEvent`, then
    /// run.
    pub fn send_event(&mut self, event: Ev) {
        self.io.events.borrow_mut().push_back(event);
        self.run();
    }

    /// Whether a terminal result is currently queued.
    pub fn has_result(&self) -> bool {
        self.io.has_result.get()
    }

    /// Run the engine once more, then return the terminal result or fail
    /// with [`NoResult`] if the computation has not yet completed.
    pub fn get_result(&mut self) -> Result<T, NoResult> {
        self.run();
        if !self.io.has_result.get() {
            return Err(NoResult);
        }
        let mut outputs = self.io.outputs.borrow_mut();
        let index = outputs
            .iter()
            .position(|event| event.result.is_some())
            .expect("has_result is set without a queued result event");
        let mut event = outputs.remove(index).expect("index came from this deque");
        let value = event.result.take().expect("checked above");
        if !event.is_empty() {
            outputs.insert(index, event);
        }
        self.io.has_result.set(outputs.iter().any(|e| e.result.is_some()));
        Ok(value)
    }

    /// Whether the computation has returned or errored.
    pub fn finished(&self) -> bool {
        self.state == LifecycleState::Ended
    }

    /// Whether the buffer currently holds unconsumed bytes.
    pub fn has_more_data(&self) -> bool {
        self.io.buffer.borrow().data_size() > 0
    }

    /// Take all currently buffered, unconsumed bytes back out.
    pub fn readall(&mut self) -> Vec<u8> {
        self.io
            .buffer
            .borrow_mut()
            .pull(0)
            .expect("pull(0) never starves")
    }

    /// Convenience: `send(data)`, then (if `strict`) reject leftover bytes,
    /// then `get_result()`.
    pub fn parse(&mut self, data: &[u8], strict: bool) -> Result<T, ParseError> {
        self.send(data)?;
        if strict && self.has_more_data() {
            return Err(ParseError::residual());
        }
        self.get_result().map_err(ParseError::new)
    }

    /// A reference blocking driver: drains output events (writing bytes,
    /// closing, raising on error, returning on result), then reads more
    /// bytes from `socket` and feeds them, looping until a result or error
    /// is reached.
    pub fn run_io<S>(&mut self, mut socket: S) -> Result<T, ParseError>
    where
        S: std::io::Read + std::io::Write,
    {
        loop {
            while let Some(event) = self.next() {
                if let Some(bytes) = &event.bytes_to_send {
                    socket.write_all(bytes).map_err(ParseError::new)?;
                }
                if let Some(error) = event.error {
                    return Err(error);
                }
                if let Some(result) = event.result {
                    return Ok(result);
                }
                if event.should_close {
                    return Err(ParseError::runtime("parser closed the connection"));
                }
            }

            let mut chunk = [0u8; 4096];
            let n = socket.read(&mut chunk).map_err(ParseError::new)?;
            if n == 0 {
                return Err(ParseError::runtime("need data"));
            }
            self.send(&chunk[..n])?;
        }
    }
}

impl<T, Ev> Iterator for Parser<T, Ev> {
    type Item = OutputEvent<T>;

    /// Yields and removes output events in FIFO order. Exhaustion just
    /// means no events are pending right now, not that the parser ended.
    fn next(&mut self) -> Option<Self::Item> {
        self.io.outputs.borrow_mut().pop_front()
    }
}

impl<T: AsRef<[u8]>, Ev> Parser<T, Ev> {
    /// Drain all queued output events, concatenating every `bytes_to_send`
    /// and `result` payload. Used by [`crate::engine::ParserChain`] to
    /// forward one stage's results into the next stage's input.
    pub fn read_output_bytes(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        for mut event in self.io.outputs.borrow_mut().drain(..) {
            if let Some(bytes) = event.bytes_to_send.take() {
                out.extend(bytes);
            }
            if let Some(result) = event.result.take() {
                out.extend_from_slice(result.as_ref());
            }
        }
        self.io.has_result.set(false);
        out
    }
}

/// A linear pipeline where each parser's terminal result feeds the next
/// parser's input.
///
/// Every stage must share a result type that can be viewed as bytes
/// (`T: AsRef<[u8]>`), since the forwarded value becomes raw input to the
/// next stage.
pub struct ParserChain<T, Ev = ()> {
    stages: Vec<Parser<T, Ev>>,
}

impl<T: AsRef<[u8]>, Ev> ParserChain<T, Ev> {
    /// Build a chain from an ordered, non-empty list of stages.
    pub fn new(stages: Vec<Parser<T, Ev>>) -> Self {
        assert!(!stages.is_empty(), "a parser chain needs at least one stage");
        Self { stages }
    }

    /// Push `data` into the first stage, then run.
    pub fn send(&mut self, data: &[u8]) -> Result<(), ParseError> {
        self.stages[0].send(data)
    }
}

impl<T: AsRef<[u8]>, Ev> Iterator for ParserChain<T, Ev> {
    type Item = OutputEvent<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut i = 0;
            loop {
                if i >= self.stages.len() {
                    return None;
                }
                match self.stages[i].next() {
                    Some(mut event) => {
                        let has_successor = i + 1 < self.stages.len();
                        if has_successor {
                            if let Some(result) = event.result.take() {
                                if let Err(err) = self.stages[i + 1].send(result.as_ref()) {
                                    return Some(OutputEvent::error(err));
                                }
                            }
                            if event.is_empty() {
                                break;
                            }
                        }
                        return Some(event);
                    }
                    None => {
                        if i + 1 < self.stages.len() {
                            i += 1;
                            continue;
                        }
                        return None;
                    }
                }
            }
        }
    }
}
