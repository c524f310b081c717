#![no_main]

use libfuzzer_sys::fuzz_target;
use trapio::engine::{EngineConfig, Parser};

const MAX_BODY: usize = 8192;

fn config() -> EngineConfig {
    EngineConfig::with_buffer_capacity(MAX_BODY + 1)
}

fn computation(io: trapio::engine::TrapIo<Vec<u8>>) -> impl std::future::Future<Output = Vec<u8>> {
    async move {
        let bytes = io.read_until(b"\r\n\r\n".to_vec(), true);
        match bytes {
            Ok(fut) => fut.await.unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }
}

// Feeds the same bytes to an HTTP-style delimiter read in one shot and then
// again split across arbitrarily many partitions, and checks both runs land
// on the same result. Exercises the buffer's compaction path (many small
// `push`es) and the trap engine's suspend/resume boundary at once.
fuzz_target!(|input: (Vec<u8>, Vec<u8>)| {
    let (body, cut_points) = input;
    if body.is_empty() || body.len() > MAX_BODY {
        return;
    }

    let one_shot = {
        let mut parser: Parser<Vec<u8>> = Parser::with_config(config(), computation);
        let _ = parser.send(&body);
        parser.get_result().ok()
    };

    let mut parser: Parser<Vec<u8>> = Parser::with_config(config(), computation);

    let mut offset = 0usize;
    for &cut in &cut_points {
        if offset >= body.len() {
            break;
        }
        let remaining = body.len() - offset;
        let take = 1 + (cut as usize % remaining);
        let _ = parser.send(&body[offset..offset + take]);
        offset += take;
    }
    if offset < body.len() {
        let _ = parser.send(&body[offset..]);
    }

    let partitioned = parser.get_result().ok();
    assert_eq!(one_shot, partitioned);
});
