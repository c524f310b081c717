#![no_main]

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use trapio::buffer::Buffer;
use trapio::protocols::socks5::{Addr, ClientRequest, Cmd};

// `trapio::engine::poll_once` is crate-private; a pre-loaded buffer can
// never truly suspend, so polling once with a no-op waker is exactly as
// meaningful from here as it is inside the crate's own unit tests.
fn poll_once<F: Future + ?Sized>(future: Pin<&mut F>) -> Poll<F::Output> {
    fn no_op(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        raw_waker()
    }
    fn raw_waker() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    let waker = unsafe { Waker::from_raw(raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    future.poll(&mut cx)
}

// Builds a `ClientRequest` from an arbitrary `Addr`, encodes it, decodes the
// bytes back through the real trap-driven descriptor, and checks the result
// matches what went in. Grounds the crate's `arbitrary` feature in an actual
// round trip rather than leaving it unexercised.
fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let addr = match Addr::arbitrary(&mut u) {
        Ok(addr) => addr,
        Err(_) => return,
    };

    let request = ClientRequest::new(5, Cmd::Connect, 0, addr);
    let encoded = match request.to_bytes() {
        Ok(bytes) => bytes,
        Err(_) => return,
    };

    let buffer = Rc::new(RefCell::new(Buffer::with_capacity(encoded.len().max(2))));
    if buffer.borrow_mut().push(&encoded).is_err() {
        return;
    }

    let mut future = Box::pin(ClientRequest::read(&buffer));
    let decoded = match poll_once(future.as_mut()) {
        std::task::Poll::Ready(Ok(decoded)) => decoded,
        std::task::Poll::Ready(Err(_)) => return,
        std::task::Poll::Pending => panic!("a fully pre-loaded buffer must never suspend"),
    };

    assert_eq!(decoded, request);
    assert_eq!(decoded.to_bytes().unwrap(), encoded);
});
