#![no_main]

use libfuzzer_sys::fuzz_target;
use service_runtime::config::StackConfig;
use service_runtime::core::block::SessionId;
use service_runtime::protocol::layer::SessionState;
use service_runtime::protocol::{ProtocolStack, StackDecode};
use service_runtime::utils::compression::CompressionKind;

fuzz_target!(|data: &[u8]| {
    let config = StackConfig {
        compression: CompressionKind::Lz4,
        sequence: true,
        max_frame_size: 64 * 1024,
        ..StackConfig::default()
    };
    let stack = ProtocolStack::from_config(&config);
    let mut state = SessionState::new(SessionId(1));

    // Feed arbitrary bytes the way a session buffer would.
    let mut offset = 0;
    while offset < data.len() {
        match stack.decode(&data[offset..], &mut state) {
            Ok(StackDecode::Packet { consumed, .. }) => {
                assert!(consumed > 0 && consumed <= data.len() - offset);
                offset += consumed;
            }
            Ok(StackDecode::Incomplete { needed }) => {
                if let Some(needed) = needed {
                    assert!(needed > data.len() - offset);
                }
                break;
            }
            Err(_) => break,
        }
    }
});
