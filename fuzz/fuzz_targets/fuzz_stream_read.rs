#![no_main]

use libfuzzer_sys::fuzz_target;
use service_runtime::core::stream::{Endian, Stream, ValueKind};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, body)) = data.split_first() else {
        return;
    };
    let endian = if selector & 1 == 0 { Endian::Big } else { Endian::Little };
    let mut stream = Stream::from_slice(body).with_endian(endian);

    // Every failed read must leave the cursor where it was.
    for step in 0..64u8 {
        let before = stream.pos();
        let ok = match (selector.wrapping_add(step)) % 6 {
            0 => stream.read::<u32>().is_ok(),
            1 => stream.read::<f64>().is_ok(),
            2 => stream.read_string().is_ok(),
            3 => stream.read_buffer().is_ok(),
            4 => stream.read_value(ValueKind::Int64).is_ok(),
            _ => stream.read_streamable::<Vec<u16>>().is_ok(),
        };
        if !ok {
            assert_eq!(stream.pos(), before);
        }
        if stream.remaining() == 0 {
            break;
        }
    }
});
