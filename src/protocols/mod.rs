//! Worked protocol exemplars built entirely from [`crate::schema`].
//!
//! Each module here is a binary format expressed purely in terms of the
//! descriptor algebra: no protocol gets special-cased support in `buffer`,
//! `trap`, or `engine`. [`socks5`] and [`tls13`] both need a field whose
//! shape depends on a sibling field's value (`atyp`, `ext_type`,
//! `msg_type`) — see each module's `Addr`/`Extension`/`Handshake` for how
//! that cross-field dependency is threaded as an explicit argument instead
//! of a dynamic lookup.

pub mod http;
pub mod socks5;
pub mod tls13;
