//! Arbitrary bytes must decode to a frame or a `ProtocolError`, never panic,
//! and every decoded frame must re-encode to the same bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use spool_proto::Frame;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::decode(data) {
        assert_eq!(&frame.to_bytes()[..], data);
    }
});
