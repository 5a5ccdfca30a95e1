#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Write;
use trawl::index::run::RunReader;

fuzz_target!(|data: &[u8]| {
    let Ok(mut file) = tempfile::NamedTempFile::new() else {
        return;
    };
    if file.write_all(data).and_then(|_| file.flush()).is_err() {
        return;
    }

    // Malformed runs must surface as errors, never panics or huge allocations
    if let Ok(reader) = RunReader::open(file.path()) {
        if let Ok(groups) = reader.read_all() {
            assert!(groups.windows(2).all(|w| w[0].0 < w[1].0));
            for (_, list) in &groups {
                assert!(list.windows(2).all(|w| w[0].doc_id < w[1].doc_id));
            }
        }
    }
});
