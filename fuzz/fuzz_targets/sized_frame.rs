//! Size prefix followed by a frame, as a consumer reads it off the wire.

#![no_main]

use libfuzzer_sys::fuzz_target;
use spool_proto::{
    Frame,
    transport::{SIZE_PREFIX_LEN, decode_size},
};

const MAX_FRAME: usize = 1024 * 1024;

fuzz_target!(|data: &[u8]| {
    let Some((prefix, rest)) = data.split_first_chunk::<SIZE_PREFIX_LEN>() else {
        return;
    };
    let Ok(size) = decode_size(*prefix, MAX_FRAME) else {
        return;
    };
    assert!(size <= MAX_FRAME);
    if let Some(body) = rest.get(..size) {
        let _ = Frame::decode(body);
    }
});
