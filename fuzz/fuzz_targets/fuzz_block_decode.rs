#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use trawl::index::Codec;
use trawl::index::codec::decode_block;

#[derive(Arbitrary, Debug)]
struct Input {
    varbyte: bool,
    docs: Vec<u8>,
    freqs: Vec<u8>,
    prev_last: Option<u32>,
    expected_last: u32,
}

fuzz_target!(|input: Input| {
    let codec = if input.varbyte { Codec::Varbyte } else { Codec::Raw };
    // Arbitrary bytes must be rejected with an error, never a panic
    if let Ok(block) = decode_block(
        codec,
        &input.docs,
        &input.freqs,
        input.prev_last,
        input.expected_last,
    ) {
        assert_eq!(block.doc_ids.len(), block.freqs.len());
        assert!(block.doc_ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(block.last_doc_id(), Some(input.expected_last));
    }
});
