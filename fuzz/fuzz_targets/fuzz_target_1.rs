#![no_main]

use libfuzzer_sys::fuzz_target;
use mpeg2ts_scte35::Stream;

fuzz_target!(|data: &[u8]| {
    let _ = Stream::new(data, true).decode(|cue| {
        let _ = serde_json::to_string(&cue);
    });
    let _ = Stream::new(data, false).show_to(std::io::sink());
});
