//! A sans-I/O incremental binary-protocol parser engine.
//!
//! A parse computation is an ordinary `async fn` that `.await`s the trap
//! futures in [`trap`] (usually through the ergonomic [`engine::TrapIo`]
//! handle), suspending exactly at the point where a buffer starves instead
//! of unwinding and restarting. [`engine::Parser`] owns the buffer, drives
//! the computation with a no-op waker, and exposes a small, explicit
//! lifecycle: feed bytes in with [`Parser::send`](engine::Parser::send),
//! drain [`engine::OutputEvent`]s out, read back the terminal result once
//! it's ready.
//!
//! [`schema`] builds on top of this with a small, composable algebra of
//! bidirectional field descriptors — and the [`schema!`] declarative macro
//! for combining them into named records — used in turn by the worked
//! protocol exemplars in [`protocols`]: SOCKS5, TLS 1.3 handshakes, and
//! HTTP/1.1 response framing.
//!
//! None of this owns a socket. Feeding bytes in and writing bytes out is the
//! host's job; see [`engine::Parser::run_io`] for a minimal reference driver
//! over anything that implements [`std::io::Read`] + [`std::io::Write`].
//!
//! # Example
//! ```
//! use trapio::engine::Parser;
//!
//! let mut parser: Parser<Vec<u8>> = Parser::new(|io| async move {
//!     let mut data = io.read(5).await.unwrap();
//!     data.extend(io.read(3).await.unwrap());
//!     data
//! });
//! parser.send(b"hello").unwrap();
//! parser.send(b"!!!").unwrap();
//! assert_eq!(parser.get_result().unwrap(), b"hello!!!");
//! ```

#![warn(missing_docs)]

// Needs to be first so other modules can see the macros.
#[macro_use]
mod macros;

pub mod buffer;
pub mod engine;
mod error;
pub mod protocols;
pub mod schema;
pub mod trap;

pub use crate::error::{ErrorKind, NoResult, ParseError, ParseResult};
