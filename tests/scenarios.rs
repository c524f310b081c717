//! End-to-end scenarios exercising the engine, schema algebra, and worked
//! protocol exemplars together, the way a host application would.

use std::cell::RefCell;
use std::future::Future;
use std::net::Ipv6Addr;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use trapio::buffer::Buffer;
use trapio::engine::{EngineConfig, Parser, SharedBuffer, TrapIo};
use trapio::protocols::socks5::{Addr, AddrHost, Handshake, Reply, Rep};
use trapio::protocols::tls13::{
    CipherSuite, ClientHello, Extension, ExtensionData, ExtensionType, Handshake as TlsHandshake,
    HandshakeBody, HandshakeType,
};

fn noop_waker() -> Waker {
    fn no_op(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        raw_waker()
    }
    fn raw_waker() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    unsafe { Waker::from_raw(raw_waker()) }
}

fn poll_once<F: Future + ?Sized>(future: Pin<&mut F>) -> Poll<F::Output> {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    future.poll(&mut cx)
}

fn block_on<F: Future>(future: F) -> F::Output {
    let mut future = Box::pin(future);
    match poll_once(future.as_mut()) {
        Poll::Ready(value) => value,
        Poll::Pending => panic!("pre-loaded parse unexpectedly suspended"),
    }
}

fn buffer_with(bytes: &[u8]) -> SharedBuffer {
    let buffer = Rc::new(RefCell::new(Buffer::with_capacity(bytes.len().max(2))));
    buffer.borrow_mut().push(bytes).unwrap();
    buffer
}

/// Splits `data` into `1..=max_chunk`-byte pieces deterministically from a
/// small seed, standing in for the property's "random partitioning".
fn chunks(data: &[u8], max_chunk: usize, seed: u64) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut state = seed.wrapping_add(1);
    let mut offset = 0;
    while offset < data.len() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let take = (((state >> 33) as usize % max_chunk) + 1).min(data.len() - offset);
        out.push(&data[offset..offset + take]);
        offset += take;
    }
    out
}

#[derive(Debug, PartialEq)]
struct Scenario1 {
    head: Vec<u8>,
    haha: Vec<u8>,
    struct_h: [u8; 2],
    int3: i128,
    peek2: Vec<u8>,
    content: Vec<u8>,
}

fn http_then_raw_reads(
    io: TrapIo<Scenario1>,
) -> impl Future<Output = Scenario1> {
    async move {
        let head = io
            .read_until(b"\r\n\r\n".to_vec(), true)
            .unwrap()
            .await
            .unwrap();
        let haha = io.read(4).await.unwrap();
        let struct_h = io.read_struct::<2>().await.unwrap();
        let int3 = io.read_int(3, true, false).unwrap().await.unwrap();
        let peek2 = io.peek(2).unwrap().await.unwrap();
        let content = io.read(7).await.unwrap();
        Scenario1 {
            head,
            haha,
            struct_h,
            int3,
            peek2,
            content,
        }
    }
}

#[test]
fn http_response_framing_in_random_chunks() {
    let input = b"HTTP/1.1 200 OK\r\nH: v\r\n\r\nhaha\x08\x08\x11\x11\x11content";
    let mut parser: Parser<Scenario1> =
        Parser::with_config(EngineConfig::with_buffer_capacity(input.len() + 1), http_then_raw_reads);

    for chunk in chunks(input, 29, 7) {
        parser.send(chunk).unwrap();
    }

    let result = parser.get_result().unwrap();
    let head = String::from_utf8(result.head).unwrap();
    assert!(head.lines().any(|line| line == "H: v"));
    assert_eq!(result.haha, b"haha");
    assert_eq!(result.struct_h, [0x08, 0x08]);
    assert_eq!(result.int3, 0x111111);
    assert_eq!(result.peek2, b"co");
    assert_eq!(result.content, b"content");
}

#[test]
fn socks5_handshake_round_trips() {
    let handshake = Handshake::new(5, vec![0x00, 0x02]);
    let bytes = handshake.to_bytes().unwrap();
    assert_eq!(bytes, vec![0x05, 0x02, 0x00, 0x02]);

    let buffer = buffer_with(&bytes);
    let decoded = block_on(Handshake::read(&buffer)).unwrap();
    assert_eq!(decoded, handshake);
}

#[test]
fn socks5_reply_ipv6_round_trips() {
    let reply = Reply::new(
        5,
        Rep::Succeeded,
        0,
        Addr {
            host: AddrHost::V6("::1".parse::<Ipv6Addr>().unwrap()),
            port: 8080,
        },
    );
    let bytes = reply.to_bytes().unwrap();
    let buffer = buffer_with(&bytes);
    let decoded = block_on(Reply::read(&buffer)).unwrap();
    assert_eq!(decoded, reply);
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
}

#[test]
fn tls13_client_hello_round_trips() {
    let nonce: Vec<u8> = (0..32u8).collect();
    let hello = ClientHello::new(
        vec![0x03, 0x03],
        nonce,
        Vec::new(),
        vec![CipherSuite::Aes128GcmSha256, CipherSuite::Aes128Ccm8Sha256],
        vec![0x01, 0x00],
        vec![Extension {
            ext_type: ExtensionType::EarlyData,
            ext_data: ExtensionData::EarlyData(b"some data".to_vec()),
        }],
    );
    let handshake = TlsHandshake {
        msg_type: HandshakeType::ClientHello,
        msg: HandshakeBody::ClientHello(hello),
    };
    let bytes = handshake.write().unwrap();

    let buffer = buffer_with(&bytes);
    let decoded = block_on(TlsHandshake::read(&buffer)).unwrap();
    assert_eq!(decoded, handshake);
}

#[test]
fn starving_partition_resolves_only_once_complete() {
    let mut parser: Parser<Vec<u8>> = Parser::new(|io| async move { io.read(4).await.unwrap() });

    for byte in [1u8, 2, 3] {
        parser.send(&[byte]).unwrap();
        assert!(matches!(
            parser.state(),
            trapio::engine::LifecycleState::Waiting
        ));
        assert!(!parser.has_result());
    }

    parser.send(&[4]).unwrap();
    assert_eq!(parser.get_result().unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn parser_chain_transforms_every_record() {
    // Stage 1: read 3-byte records and emit them reversed. Stage 2: read
    // the (already reversed) 3-byte records and emit them byte-swapped
    // again, so two stages compose into a net identity transform that
    // still proves every record crosses both stages in order.
    fn permute(io: TrapIo<Vec<u8>>) -> impl Future<Output = Vec<u8>> {
        async move {
            loop {
                let mut record = io.read(3).await.unwrap();
                record.reverse();
                io.respond(trapio::engine::OutputEvent::result(record));
            }
        }
    }

    let stage1: Parser<Vec<u8>> = Parser::new(permute);
    let stage2: Parser<Vec<u8>> = Parser::new(permute);
    let mut chain = trapio::engine::ParserChain::new(vec![stage1, stage2]);

    let records: Vec<[u8; 3]> = (0..10u8).map(|i| [i, i + 1, i + 2]).collect();
    let mut input = Vec::new();
    for record in &records {
        input.extend_from_slice(record);
    }
    chain.send(&input).unwrap();

    let mut produced = Vec::new();
    while let Some(event) = chain.next() {
        if let Some(result) = event.result {
            produced.push(result);
        }
    }

    assert_eq!(produced.len(), 10);
    for (original, got) in records.iter().zip(produced.iter()) {
        assert_eq!(got, original);
    }
}
