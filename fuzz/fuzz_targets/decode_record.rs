#![no_main]

use libfuzzer_sys::fuzz_target;
use tunecast_core::{decode_record, Separators};

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(record) = decode_record(line, Separators::default()) {
        let _ = record.float_fields();
        let _ = record.int_key();
    }
});
