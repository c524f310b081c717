//! SOCKS5 (RFC 1928) handshake, request, reply, and UDP relay framing.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::engine::SharedBuffer;
use crate::error::ParseError;
use crate::schema::{
    u16be_field, u8_field, utf8_length_prefixed_string, Bytes, Descriptor, LengthPrefixedBytes,
    MustEqual, SizedIntEnum,
};
use crate::trap;

fn must_equal_u8(expected: u8) -> MustEqual<crate::schema::NarrowInt<u8>> {
    MustEqual {
        inner: u8_field(),
        expected,
    }
}

closed_enum! {
    /// The authentication method negotiated during the handshake.
    pub enum AuthMethod : u8 {
        NoAuth = 0,
        Gssapi = 1,
        UserAuth = 2,
        NoAcceptableMethod = 255,
    }
}

closed_enum! {
    /// The requested SOCKS5 command.
    pub enum Cmd : u8 {
        Connect = 1,
        Bind = 2,
        Associate = 3,
    }
}

closed_enum! {
    /// The server's reply code.
    pub enum Rep : u8 {
        Succeeded = 0,
        GeneralFailure = 1,
        NotAllowed = 2,
        NetworkUnreachable = 3,
        HostUnreachable = 4,
        ConnectionRefused = 5,
        TtlExpired = 6,
        CommandNotSupported = 7,
        AddressTypeNotSupported = 8,
    }
}

/// The address carried by [`Addr`], tagged by its address-type byte.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum AddrHost {
    /// `atyp == 1`.
    V4(Ipv4Addr),
    /// `atyp == 4`.
    V6(Ipv6Addr),
    /// `atyp == 3`.
    Hostname(String),
}

/// `atyp` + address + `port`, the SOCKS5 address triple used by requests,
/// replies, and UDP relay headers.
///
/// `atyp` and `host` are a single Rust-level field pair: `host`'s shape is
/// fully determined by `atyp`, which `Addr::read` consumes first and keeps
/// only to pick `host`'s variant, so there's no separate sibling lookup to
/// thread through — unlike [`crate::protocols::tls13::Extension`], where
/// the discriminant and the dependent field live in the same record but are
/// read independently.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct Addr {
    /// The decoded host, carrying its own address-type tag.
    pub host: AddrHost,
    /// The port.
    pub port: u16,
}

impl Addr {
    fn atyp(&self) -> u8 {
        match &self.host {
            AddrHost::V4(_) => 1,
            AddrHost::V6(_) => 4,
            AddrHost::Hostname(_) => 3,
        }
    }
}

/// The descriptor for [`Addr`], usable as an ordinary schema field.
pub struct AddrField;

impl Descriptor for AddrField {
    type Value = Addr;

    async fn read(&self, buffer: &SharedBuffer) -> Result<Addr, ParseError> {
        let atyp = u8_field().read(buffer).await?;
        let host = match atyp {
            1 => {
                let raw = trap::read(buffer.clone(), 4).await?;
                AddrHost::V4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))
            }
            4 => {
                let raw = trap::read(buffer.clone(), 16).await?;
                let octets: [u8; 16] = raw.try_into().expect("read exactly 16 bytes");
                AddrHost::V6(Ipv6Addr::from(octets))
            }
            3 => {
                let name = utf8_length_prefixed_string(u8_field()).read(buffer).await?;
                AddrHost::Hostname(name)
            }
            other => return Err(ParseError::semantic(format!("unknown SOCKS5 atyp {other}"))),
        };
        let port = u16be_field().read(buffer).await?;
        Ok(Addr { host, port })
    }

    fn write(&self, value: &Addr) -> Result<Vec<u8>, ParseError> {
        let mut out = u8_field().write(&value.atyp())?;
        match &value.host {
            AddrHost::V4(ip) => out.extend_from_slice(&ip.octets()),
            AddrHost::V6(ip) => out.extend_from_slice(&ip.octets()),
            AddrHost::Hostname(name) => {
                out.extend(utf8_length_prefixed_string(u8_field()).write(name)?)
            }
        }
        out.extend(u16be_field().write(&value.port)?);
        Ok(out)
    }
}

schema! {
    /// The client's initial method-negotiation handshake.
    pub struct Handshake {
        ver: u8 = must_equal_u8(5),
        methods: Vec<u8> = LengthPrefixedBytes { len_desc: u8_field() },
    }
}

schema! {
    /// The server's chosen authentication method.
    pub struct ServerSelection {
        ver: u8 = must_equal_u8(5),
        method: AuthMethod = SizedIntEnum::new(crate::schema::IntUnit::U8),
    }
}

schema! {
    /// A client connection request.
    pub struct ClientRequest {
        ver: u8 = must_equal_u8(5),
        cmd: Cmd = SizedIntEnum::new(crate::schema::IntUnit::U8),
        rsv: u8 = must_equal_u8(0),
        addr: Addr = AddrField,
    }
}

schema! {
    /// The server's reply to a [`ClientRequest`].
    pub struct Reply {
        ver: u8 = must_equal_u8(5),
        rep: Rep = SizedIntEnum::new(crate::schema::IntUnit::U8),
        rsv: u8 = must_equal_u8(0),
        bind_addr: Addr = AddrField,
    }
}

fn must_equal_zero_pair() -> MustEqual<Bytes> {
    MustEqual {
        inner: Bytes { length: 2 },
        expected: vec![0x00, 0x00],
    }
}

schema! {
    /// One UDP relay datagram: a reserved pair of zero bytes, a fragment
    /// flag, the destination address, and the carried payload.
    pub struct UdpRelay {
        rsv: Vec<u8> = must_equal_zero_pair(),
        frag: u8 = u8_field(),
        addr: Addr = AddrField,
        data: Vec<u8> = Bytes { length: -1 },
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
    fn handshake_round_trips() {
        let buffer = buffer_with(&[0x05, 0x02, 0x00, 0x02]);
        let handshake = block_on(Handshake::read(&buffer)).unwrap();
        assert_eq!(handshake.methods(), &vec![0x00, 0x02]);
        assert_eq!(handshake.to_bytes().unwrap(), vec![0x05, 0x02, 0x00, 0x02]);
    }

    #[test]
    fn client_request_hostname_round_trips() {
        let mut raw = vec![0x05, 0x01, 0x00, 0x03, 0x03];
        raw.extend_from_slice(b"foo");
        raw.extend_from_slice(&[0x01, 0xbb]);
        let buffer = buffer_with(&raw);
        let request = block_on(ClientRequest::read(&buffer)).unwrap();
        assert_eq!(request.addr().port, 0x01bb);
        assert_eq!(request.addr().host, AddrHost::Hostname("foo".to_string()));
        assert_eq!(request.to_bytes().unwrap(), raw);
    }

    #[test]
    fn reply_rejects_bad_version() {
        let buffer = buffer_with(&[0x04, 0x00, 0x00, 0x01, 1, 2, 3, 4, 0, 80]);
        assert!(block_on(Reply::read(&buffer)).is_err());
    }

    #[test]
    fn udp_relay_hostname_round_trips() {
        let mut raw = vec![0x00, 0x00, 0x00, 0x03, 0x0a];
        raw.extend_from_slice(b"google.com");
        raw.extend_from_slice(&[0x00, 0x50]);
        raw.extend_from_slice(b"payload");
        let buffer = buffer_with(&raw);
        let relay = block_on(UdpRelay::read(&buffer)).unwrap();
        assert_eq!(*relay.frag(), 0);
        assert_eq!(relay.addr().host, AddrHost::Hostname("google.com".to_string()));
        assert_eq!(relay.addr().port, 80);
        assert_eq!(relay.data(), b"payload");
        assert_eq!(relay.to_bytes().unwrap(), raw);
    }

    #[test]
    fn udp_relay_rejects_nonzero_reserved_bytes() {
        let buffer = buffer_with(&[0x00, 0x01, 0x00, 0x01, 1, 2, 3, 4, 0, 80]);
        assert!(block_on(UdpRelay::read(&buffer)).is_err());
    }
}
