use std::borrow::Cow;
use std::error::Error;
use std::fmt::{self, Display};

use crate::buffer::BufferError;

used_in_docs!(BufferError);

type BoxedError = Box<dyn Error + Send + Sync + 'static>;

/// A specialized result type used throughout the crate.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// The error type surfaced by a [`Parser`](crate::engine::Parser) and by
/// descriptor `read`/`write` implementations.
///
/// [`BufferError`] never escapes a parser: `Starving` is absorbed into a
/// suspension and `Overflow` is rewrapped here as [`ErrorKind::Overflow`] so
/// callers only ever match on one error type.
#[derive(Debug)]
pub struct ParseError {
    kind: ErrorKind,
    source: Option<BoxedError>,
}

impl ParseError {
    /// Build an error from an arbitrary error payload, tagged [`ErrorKind::External`].
    pub fn new<E>(error: E) -> Self
    where
        E: Into<BoxedError>,
    {
        Self {
            kind: ErrorKind::External,
            source: Some(error.into()),
        }
    }

    pub(crate) fn custom(kind: ErrorKind, msg: impl Message) -> Self {
        Self {
            kind,
            source: Some(Box::new(CustomMessageError::new(msg))),
        }
    }

    /// The [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// A field mismatched a `MustEqual`/`Switch`/`SizedIntEnum` constraint.
    pub fn semantic(msg: impl Message) -> Self {
        Self::custom(ErrorKind::Semantic, msg)
    }

    /// Strict-mode parse left bytes unconsumed.
    pub fn residual() -> Self {
        Self::custom(ErrorKind::Residual, "redundant data left")
    }

    /// A trap was constructed with an out-of-range argument.
    pub fn invalid_argument(msg: impl Message) -> Self {
        Self::custom(ErrorKind::InvalidArgument, msg)
    }

    /// The parse computation yielded something that was not a recognized trap.
    pub fn runtime(msg: impl Message) -> Self {
        Self::custom(ErrorKind::Runtime, msg)
    }

    pub(crate) fn from_overflow(err: BufferError) -> Self {
        Self {
            kind: ErrorKind::Overflow,
            source: Some(Box::new(err)),
        }
    }
}

/// A list specifying general categories of parse error.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A descriptor's value did not satisfy a constraint (`MustEqual`,
    /// `Switch` on an unmapped case, `SizedIntEnum` on an unknown value).
    Semantic,

    /// `strict` parsing left unconsumed bytes in the buffer.
    Residual,

    /// A trap was constructed with an argument outside its valid range.
    InvalidArgument,

    /// The parse computation yielded a value that was not a known trap, or
    /// the computation itself panicked.
    Runtime,

    /// A `push` would have exceeded the buffer's capacity.
    Overflow,

    /// An error supplied by the host through `respond(error = ..)`, or
    /// wrapped with [`ParseError::new`].
    External,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Semantic => f.write_str("semantic mismatch")?,
            ErrorKind::Residual => f.write_str("redundant data left")?,
            ErrorKind::InvalidArgument => f.write_str("invalid trap argument")?,
            ErrorKind::Runtime => f.write_str("broken parse computation")?,
            ErrorKind::Overflow => f.write_str("buffer overflow")?,
            ErrorKind::External => {
                if self.source.is_none() {
                    f.write_str("external error")?;
                }
            }
        }

        if let Some(source) = &self.source {
            f.write_str(": ")?;
            source.fmt(f)?;
        }

        Ok(())
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(source) => Some(&**source),
            None => None,
        }
    }
}

impl From<BoxedError> for ParseError {
    fn from(error: BoxedError) -> Self {
        Self {
            kind: ErrorKind::External,
            source: Some(error),
        }
    }
}

/// Raised by [`Parser::get_result`](crate::engine::Parser::get_result) when
/// the parse computation has not yet produced a terminal result.
#[derive(Debug)]
pub struct NoResult;

impl Display for NoResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no result: parser still expects input")
    }
}

impl Error for NoResult {}

pub(crate) trait Message: Display {
    fn as_str(&self) -> Option<&'static str>;
}

impl Message for &'static str {
    fn as_str(&self) -> Option<&'static str> {
        Some(self)
    }
}

impl Message for String {
    fn as_str(&self) -> Option<&'static str> {
        None
    }
}

impl Message for fmt::Arguments<'_> {
    fn as_str(&self) -> Option<&'static str> {
        self.as_str()
    }
}

#[derive(Debug)]
struct CustomMessageError(Cow<'static, str>);

impl CustomMessageError {
    fn new(msg: impl Message) -> Self {
        Self(match msg.as_str() {
            Some(s) => Cow::Borrowed(s),
            None => msg.to_string().into(),
        })
    }
}

impl fmt::Display for CustomMessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for CustomMessageError {}
