//! TLS 1.3 handshake messages and the record-layer framing around them
//! (RFC 8446 §4 and §5), as a worked example of a record whose nested field
//! shape depends on a sibling discriminant (`Extension::ext_data` on
//! `ext_type`, `Handshake::msg` on `msg_type`).

use crate::engine::SharedBuffer;
use crate::error::ParseError;
use crate::schema::{
    read_nested, u16be_field, u24be_field, u8_field, AsDescriptor, Bytes, Descriptor,
    LengthPrefixedBytes, LengthPrefixedObjectList, MustEqual, SizedIntEnum,
};

fn must_equal_bytes(expected: &[u8]) -> MustEqual<Bytes> {
    MustEqual {
        inner: Bytes {
            length: expected.len() as isize,
        },
        expected: expected.to_vec(),
    }
}

closed_enum! {
    /// A TLS extension's wire identifier.
    pub enum ExtensionType : u16 {
        ServerName = 0,
        SupportedGroups = 10,
        SignatureAlgorithms = 13,
        SupportedVersions = 43,
        PskKeyExchangeModes = 45,
        EarlyData = 42,
        KeyShare = 51,
    }
}

closed_enum! {
    /// A handshake message's type byte.
    pub enum HandshakeType : u8 {
        ClientHello = 1,
        ServerHello = 2,
        NewSessionTicket = 4,
        EndOfEarlyData = 5,
        EncryptedExtensions = 8,
        Certificate = 11,
        CertificateRequest = 13,
        CertificateVerify = 15,
        Finished = 20,
        KeyUpdate = 24,
        MessageHash = 254,
    }
}

closed_enum! {
    /// The record layer's content type.
    pub enum ContentType : u8 {
        Invalid = 0,
        ChangeCipherSpec = 20,
        Alert = 21,
        Handshake = 22,
        ApplicationData = 23,
    }
}

closed_enum! {
    /// `ServerNameList`'s single defined name type.
    pub enum NameType : u8 {
        HostName = 0,
    }
}

closed_enum! {
    /// A signature algorithm offered or selected during the handshake.
    pub enum SignatureScheme : u16 {
        RsaPkcs1Sha256 = 0x0401,
        RsaPkcs1Sha384 = 0x0501,
        RsaPkcs1Sha512 = 0x0601,
        EcdsaSecp256r1Sha256 = 0x0403,
        EcdsaSecp384r1Sha384 = 0x0503,
        EcdsaSecp521r1Sha512 = 0x0603,
        RsaPssRsaeSha256 = 0x0804,
        RsaPssRsaeSha384 = 0x0805,
        RsaPssRsaeSha512 = 0x0806,
        Ed25519 = 0x0807,
        Ed448 = 0x0808,
        RsaPssPssSha256 = 0x0809,
        RsaPssPssSha384 = 0x080a,
        RsaPssPssSha512 = 0x080b,
        RsaPkcs1Sha1 = 0x0201,
        EcdsaSha1 = 0x0203,
    }
}

closed_enum! {
    /// A named elliptic-curve or finite-field group.
    pub enum NamedGroup : u16 {
        Secp256r1 = 0x0017,
        Secp384r1 = 0x0018,
        Secp521r1 = 0x0019,
        X25519 = 0x001D,
        X448 = 0x001E,
        Ffdhe2048 = 0x0100,
        Ffdhe3072 = 0x0101,
        Ffdhe4096 = 0x0102,
        Ffdhe6144 = 0x0103,
        Ffdhe8192 = 0x0104,
    }
}

closed_enum! {
    /// A pre-shared-key exchange mode.
    pub enum PskKeyExchangeMode : u8 {
        PskKe = 0,
        PskDheKe = 1,
    }
}

closed_enum! {
    /// A TLS 1.3 cipher suite.
    pub enum CipherSuite : u16 {
        Aes128GcmSha256 = 0x1301,
        Aes256GcmSha384 = 0x1302,
        Chacha20Poly1305Sha256 = 0x1303,
        Aes128CcmSha256 = 0x1304,
        Aes128Ccm8Sha256 = 0x1305,
    }
}

schema! {
    /// A single entry in a `server_name` extension's name list.
    pub struct ServerName {
        name_type: NameType = MustEqual { inner: SizedIntEnum::new(crate::schema::IntUnit::U8), expected: NameType::HostName },
        name: String = crate::schema::utf8_length_prefixed_string(u16be_field()),
    }
}

/// The payload carried by an [`Extension`], tagged by `ext_type`.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtensionData {
    /// `server_name`.
    ServerName(Vec<ServerName>),
    /// `supported_versions`.
    SupportedVersions(Vec<[u8; 2]>),
    /// `signature_algorithms`.
    SignatureAlgorithms(Vec<SignatureScheme>),
    /// `supported_groups`.
    SupportedGroups(Vec<NamedGroup>),
    /// `key_share`.
    KeyShare(Vec<Vec<u8>>),
    /// `psk_key_exchange_modes`.
    PskKeyExchangeModes(Vec<PskKeyExchangeMode>),
    /// `early_data`.
    EarlyData(Vec<u8>),
}

/// One `Extension` entry of a `ClientHello`/`ServerHello`'s extension list.
///
/// `ext_data`'s shape is fully determined by `ext_type`, read first in the
/// same record: the cross-field dependency spec.md calls `Switch` is here
/// an ordinary `match` inside [`ExtensionField::read`], not a generic
/// descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct Extension {
    /// The extension's wire identifier.
    pub ext_type: ExtensionType,
    /// The extension's payload, shaped by `ext_type`.
    pub ext_data: ExtensionData,
}

/// The descriptor for [`Extension`].
pub struct ExtensionField;

impl Descriptor for ExtensionField {
    type Value = Extension;

    async fn read(&self, buffer: &SharedBuffer) -> Result<Extension, ParseError> {
        let ext_type: ExtensionType = SizedIntEnum::new(crate::schema::IntUnit::U16BE)
            .read(buffer)
            .await?;
        let len = u16be_field().read(buffer).await?;
        let bytes = crate::trap::read(buffer.clone(), len as usize).await?;
        let ext_data = match ext_type {
            ExtensionType::ServerName => ExtensionData::ServerName(
                read_nested(
                    &LengthPrefixedObjectList {
                        len_desc: u16be_field(),
                        inner: AsDescriptor::<ServerName>::new(),
                    },
                    bytes,
                )
                .await?,
            ),
            ExtensionType::SupportedVersions => ExtensionData::SupportedVersions(
                read_nested(
                    &LengthPrefixedObjectList {
                        len_desc: u8_field(),
                        inner: FixedBytes2,
                    },
                    bytes,
                )
                .await?,
            ),
            ExtensionType::SignatureAlgorithms => ExtensionData::SignatureAlgorithms(
                read_nested(
                    &LengthPrefixedObjectList {
                        len_desc: u16be_field(),
                        inner: SizedIntEnum::new(crate::schema::IntUnit::U16BE),
                    },
                    bytes,
                )
                .await?,
            ),
            ExtensionType::SupportedGroups => ExtensionData::SupportedGroups(
                read_nested(
                    &LengthPrefixedObjectList {
                        len_desc: u16be_field(),
                        inner: SizedIntEnum::new(crate::schema::IntUnit::U16BE),
                    },
                    bytes,
                )
                .await?,
            ),
            ExtensionType::KeyShare => ExtensionData::KeyShare(
                read_nested(
                    &LengthPrefixedObjectList {
                        len_desc: u16be_field(),
                        inner: LengthPrefixedBytes { len_desc: u16be_field() },
                    },
                    bytes,
                )
                .await?,
            ),
            ExtensionType::PskKeyExchangeModes => ExtensionData::PskKeyExchangeModes(
                read_nested(
                    &LengthPrefixedObjectList {
                        len_desc: u8_field(),
                        inner: SizedIntEnum::new(crate::schema::IntUnit::U8),
                    },
                    bytes,
                )
                .await?,
            ),
            ExtensionType::EarlyData => ExtensionData::EarlyData(bytes),
        };
        Ok(Extension { ext_type, ext_data })
    }

    fn write(&self, value: &Extension) -> Result<Vec<u8>, ParseError> {
        let payload = match &value.ext_data {
            ExtensionData::ServerName(names) => {
                let mut inner = Vec::new();
                for name in names {
                    inner.extend(AsDescriptor::<ServerName>::new().write(name)?);
                }
                LengthPrefixedBytes::<crate::schema::NarrowInt<u16>> { len_desc: u16be_field() }
                    .write(&inner)?
            }
            ExtensionData::SupportedVersions(versions) => {
                let mut inner = Vec::new();
                for v in versions {
                    inner.extend_from_slice(v);
                }
                LengthPrefixedBytes::<crate::schema::NarrowInt<u8>> { len_desc: u8_field() }
                    .write(&inner)?
            }
            ExtensionData::SignatureAlgorithms(schemes) => {
                let mut inner = Vec::new();
                for s in schemes {
                    inner.extend(SizedIntEnum::<SignatureScheme>::new(crate::schema::IntUnit::U16BE).write(s)?);
                }
                LengthPrefixedBytes::<crate::schema::NarrowInt<u16>> { len_desc: u16be_field() }
                    .write(&inner)?
            }
            ExtensionData::SupportedGroups(groups) => {
                let mut inner = Vec::new();
                for g in groups {
                    inner.extend(SizedIntEnum::<NamedGroup>::new(crate::schema::IntUnit::U16BE).write(g)?);
                }
                LengthPrefixedBytes::<crate::schema::NarrowInt<u16>> { len_desc: u16be_field() }
                    .write(&inner)?
            }
            ExtensionData::KeyShare(entries) => {
                let mut inner = Vec::new();
                for e in entries {
                    inner.extend(LengthPrefixedBytes::<crate::schema::NarrowInt<u16>> { len_desc: u16be_field() }.write(e)?);
                }
                LengthPrefixedBytes::<crate::schema::NarrowInt<u16>> { len_desc: u16be_field() }
                    .write(&inner)?
            }
            ExtensionData::PskKeyExchangeModes(modes) => {
                let mut inner = Vec::new();
                for m in modes {
                    inner.extend(SizedIntEnum::<PskKeyExchangeMode>::new(crate::schema::IntUnit::U8).write(m)?);
                }
                LengthPrefixedBytes::<crate::schema::NarrowInt<u8>> { len_desc: u8_field() }
                    .write(&inner)?
            }
            ExtensionData::EarlyData(data) => data.clone(),
        };
        let mut out = SizedIntEnum::<ExtensionType>::new(crate::schema::IntUnit::U16BE).write(&value.ext_type)?;
        out.extend(u16be_field().write(&(payload.len() as u16))?);
        out.extend(payload);
        Ok(out)
    }
}

/// A fixed two-byte protocol version entry, as used in `supported_versions`.
struct FixedBytes2;

impl Descriptor for FixedBytes2 {
    type Value = [u8; 2];

    async fn read(&self, buffer: &SharedBuffer) -> Result<[u8; 2], ParseError> {
        crate::trap::read_struct::<2>(buffer.clone()).await
    }

    fn write(&self, value: &[u8; 2]) -> Result<Vec<u8>, ParseError> {
        Ok(value.to_vec())
    }
}

schema! {
    /// The `ClientHello` handshake message body.
    pub struct ClientHello {
        legacy_version: Vec<u8> = must_equal_bytes(&[0x03, 0x03]),
        rand: Vec<u8> = Bytes { length: 32 },
        legacy_session_id: Vec<u8> = LengthPrefixedBytes { len_desc: u8_field() },
        cipher_suites: Vec<CipherSuite> = LengthPrefixedObjectList { len_desc: u16be_field(), inner: SizedIntEnum::new(crate::schema::IntUnit::U16BE) },
        legacy_compression_methods: Vec<u8> = must_equal_bytes(&[0x01, 0x00]),
        extensions: Vec<Extension> = LengthPrefixedObjectList { len_desc: u16be_field(), inner: ExtensionField },
    }
}

schema! {
    /// The `ServerHello` handshake message body.
    pub struct ServerHello {
        legacy_version: Vec<u8> = must_equal_bytes(&[0x03, 0x03]),
        rand: Vec<u8> = Bytes { length: 32 },
        legacy_session_id_echo: Vec<u8> = LengthPrefixedBytes { len_desc: u8_field() },
        cipher_suite: CipherSuite = SizedIntEnum::new(crate::schema::IntUnit::U16BE),
        legacy_compression_method: u8 = crate::schema::MustEqual { inner: u8_field(), expected: 0 },
        extensions: Vec<Extension> = LengthPrefixedObjectList { len_desc: u16be_field(), inner: ExtensionField },
    }
}

/// The handshake message body, tagged by `msg_type`.
#[derive(Clone, Debug, PartialEq)]
pub enum HandshakeBody {
    /// `client_hello`.
    ClientHello(ClientHello),
    /// `server_hello`.
    ServerHello(ServerHello),
}

/// A TLS handshake-layer message: a one-byte type, a 24-bit length, and a
/// body shaped by the type.
#[derive(Clone, Debug, PartialEq)]
pub struct Handshake {
    /// The message type.
    pub msg_type: HandshakeType,
    /// The message body.
    pub msg: HandshakeBody,
}

impl Handshake {
    /// Decode one handshake message from `buffer`.
    pub async fn read(buffer: &SharedBuffer) -> Result<Handshake, ParseError> {
        let msg_type: HandshakeType = SizedIntEnum::new(crate::schema::IntUnit::U8).read(buffer).await?;
        let len = u24be_field().read(buffer).await?;
        let bytes = crate::trap::read(buffer.clone(), len as usize).await?;
        let msg = match msg_type {
            HandshakeType::ClientHello => {
                HandshakeBody::ClientHello(read_nested(&AsDescriptor::<ClientHello>::new(), bytes).await?)
            }
            HandshakeType::ServerHello => {
                HandshakeBody::ServerHello(read_nested(&AsDescriptor::<ServerHello>::new(), bytes).await?)
            }
            other => {
                return Err(ParseError::semantic(format!(
                    "unsupported handshake message type {other:?}"
                )))
            }
        };
        Ok(Handshake { msg_type, msg })
    }

    /// This message's binary form.
    pub fn write(&self) -> Result<Vec<u8>, ParseError> {
        let body = match &self.msg {
            HandshakeBody::ClientHello(hello) => hello.to_bytes()?,
            HandshakeBody::ServerHello(hello) => hello.to_bytes()?,
        };
        let mut out = SizedIntEnum::<HandshakeType>::new(crate::schema::IntUnit::U8).write(&self.msg_type)?;
        out.extend(u24be_field().write(&(body.len() as u32))?);
        out.extend(body);
        Ok(out)
    }
}

schema! {
    /// A record-layer `TLSPlaintext` frame.
    pub struct TlsPlaintext {
        content_type: ContentType = SizedIntEnum::new(crate::schema::IntUnit::U8),
        legacy_record_version: Vec<u8> = Bytes { length: 2 },
        fragment: Vec<u8> = LengthPrefixedBytes { len_desc: u16be_field() },
    }
}

schema! {
    /// An encrypted, opaque `TLSCiphertext` record.
    pub struct TlsCiphertext {
        opaque_type: ContentType = MustEqual { inner: SizedIntEnum::new(crate::schema::IntUnit::U8), expected: ContentType::ApplicationData },
        legacy_record_version: Vec<u8> = must_equal_bytes(&[0x03, 0x03]),
        encrypted_record: Vec<u8> = LengthPrefixedBytes { len_desc: u16be_field() },
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
    fn client_hello_round_trips() {
        let hello = ClientHello::new(
            vec![0x03, 0x03],
            vec![0x42; 32],
            Vec::new(),
            vec![CipherSuite::Aes128GcmSha256],
            vec![0x01, 0x00],
            vec![Extension {
                ext_type: ExtensionType::SupportedVersions,
                ext_data: ExtensionData::SupportedVersions(vec![[0x03, 0x04]]),
            }],
        );
        let bytes = hello.to_bytes().unwrap();
        let buffer = buffer_with(&bytes);
        let decoded = block_on(ClientHello::read(&buffer)).unwrap();
        assert_eq!(decoded.cipher_suites(), hello.cipher_suites());
        assert_eq!(decoded.extensions().len(), 1);
    }

    #[test]
    fn handshake_rejects_unsupported_message_type() {
        let buffer = buffer_with(&[0x04, 0x00, 0x00, 0x00]);
        let result = block_on(Handshake::read(&buffer));
        assert!(result.is_err());
    }
}
