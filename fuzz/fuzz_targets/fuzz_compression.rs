#![no_main]

use libfuzzer_sys::fuzz_target;
use service_runtime::utils::compression::{CompressionKind, Compressor};

const MAX_OUTPUT: usize = 1 << 20;

fuzz_target!(|data: &[u8]| {
    for kind in [CompressionKind::Lz4, CompressionKind::Zstd] {
        let compressor = Compressor::new(kind, 0, MAX_OUTPUT);

        // Whatever compresses must come back unchanged.
        if let Ok(compressed) = compressor.compress(data) {
            if let Ok(restored) = compressor.decompress(&compressed) {
                assert_eq!(restored, data);
            }
        }

        // Malformed input must fail cleanly and respect the output limit.
        if let Ok(out) = compressor.decompress(data) {
            assert!(out.len() <= MAX_OUTPUT);
        }
    }
});
