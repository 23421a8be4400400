//! Tokenising any line yields at least one parameter, none containing a
//! space, and rejoining them restores the line minus its terminator.

#![no_main]

use libfuzzer_sys::fuzz_target;
use spool_proto::split_params;

fuzz_target!(|line: &str| {
    let params = split_params(line);
    assert!(!params.is_empty());
    assert!(params.iter().all(|param| !param.contains(' ')));

    let stripped = line.strip_suffix('\n').unwrap_or(line);
    let stripped = stripped.strip_suffix('\r').unwrap_or(stripped);
    assert_eq!(params.join(" "), stripped);
});
