//! HTTP/1.1 response framing: a status line and headers read up to the
//! blank-line terminator, post-processed the way
//! [`EndWith`](crate::schema::EndWith) fields commonly are.

use crate::engine::SharedBuffer;
use crate::error::ParseError;
use crate::schema::{Descriptor, EndWith};

/// A decoded HTTP/1.1 response head: status line plus header lines, split
/// out of the raw `EndWith(b"\r\n\r\n")` read the way a `post_init` hook
/// would in the declarative schema macro — this record's only wire field is
/// `head`, everything else is derived.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    head: Vec<u8>,
    /// The response's HTTP version token (e.g. `HTTP/1.1`).
    pub version: Vec<u8>,
    /// The numeric status code, as its raw wire bytes (e.g. `200`).
    pub code: Vec<u8>,
    /// The reason phrase, if present.
    pub status: Vec<u8>,
    /// Every header line verbatim, excluding the status line and the
    /// trailing blank line.
    pub header_lines: Vec<Vec<u8>>,
}

impl Response {
    /// Decode one response head from `buffer`.
    pub async fn read(buffer: &SharedBuffer) -> Result<Self, ParseError> {
        let head = EndWith {
            delim: b"\r\n\r\n".to_vec(),
        }
        .read(buffer)
        .await?;
        Self::from_head(head)
    }

    fn from_head(head: Vec<u8>) -> Result<Self, ParseError> {
        let mut lines = head.split(|&b| b == b'\n').map(|line| {
            line.strip_suffix(b"\r").unwrap_or(line).to_vec()
        });
        let first_line = lines
            .next()
            .ok_or_else(|| ParseError::semantic("empty response head"))?;
        let mut parts = first_line.splitn(3, |&b| b == b' ');
        let version = parts
            .next()
            .ok_or_else(|| ParseError::semantic("missing HTTP version"))?
            .to_vec();
        let code = parts
            .next()
            .ok_or_else(|| ParseError::semantic("missing status code"))?
            .to_vec();
        let status = parts.next().unwrap_or(&[]).to_vec();
        let header_lines = lines.collect();
        Ok(Self {
            head,
            version,
            code,
            status,
            header_lines,
        })
    }

    /// The raw head bytes this response was decoded from (before the
    /// trailing `\r\n\r\n`).
    pub fn head(&self) -> &[u8] {
        &self.head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn buffer_with(bytes: &[u8]) -> SharedBuffer {
        let buffer = Rc::new(RefCell::new(crate::buffer::Buffer::with_capacity(bytes.len().max(2))));
        buffer.borrow_mut().push(bytes).unwrap();
        buffer
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        let mut future = Box::pin(future);
        match crate::engine::poll_once(future.as_mut()) {
            std::task::Poll::Ready(value) => value,
            std::task::Poll::Pending => panic!("unexpected suspension"),
        }
    }

    #[test]
    fn parses_status_line_and_headers() {
        let raw = b"HTTP/1.1 200 OK\r\nConnection: keep-alive\r\nServer: nginx\r\n\r\n";
        let buffer = buffer_with(raw);
        let response = block_on(Response::read(&buffer)).unwrap();
        assert_eq!(response.version, b"HTTP/1.1");
        assert_eq!(response.code, b"200");
        assert_eq!(response.status, b"OK");
        assert_eq!(
            response.header_lines,
            vec![b"Connection: keep-alive".to_vec(), b"Server: nginx".to_vec()]
        );
    }

    #[test]
    fn suspends_until_terminator_arrives() {
        let buffer = Rc::new(RefCell::new(crate::buffer::Buffer::new()));
        buffer.borrow_mut().push(b"HTTP/1.1 200 OK\r\n").unwrap();
        let mut future = Box::pin(Response::read(&buffer));
        assert!(matches!(
            crate::engine::poll_once(future.as_mut()),
            std::task::Poll::Pending
        ));
        buffer.borrow_mut().push(b"\r\n").unwrap();
        let response = match crate::engine::poll_once(future.as_mut()) {
            std::task::Poll::Ready(value) => value.unwrap(),
            std::task::Poll::Pending => panic!("terminator arrived, should resolve"),
        };
        assert_eq!(response.code, b"200");
    }
}
