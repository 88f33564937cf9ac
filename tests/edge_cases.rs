#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Boundary conditions of streams and protocol stacks: partial input,
//! corrupt headers, replays and layer misuse.

use service_runtime::config::{StackConfig, FRAME_MAGIC};
use service_runtime::core::block::SessionId;
use service_runtime::core::packet::Packet;
use service_runtime::core::stream::{Stream, Value, ValueKind};
use service_runtime::error::{Error, ErrorKind};
use service_runtime::protocol::compression::CompressionLayer;
use service_runtime::protocol::framing::FramingLayer;
use service_runtime::protocol::layer::{codes, SessionState};
use service_runtime::protocol::sequence::SequenceLayer;
use service_runtime::protocol::{ProtocolStack, StackDecode};
use service_runtime::utils::compression::CompressionKind;
use service_runtime::utils::crypto::Crypto;

fn session() -> SessionState {
    SessionState::new(SessionId(9))
}

fn expect_packet(decoded: StackDecode) -> (Packet, usize) {
    match decoded {
        StackDecode::Packet { packet, consumed } => (packet, consumed),
        other => panic!("expected a packet, got {other:?}"),
    }
}

fn protocol_code(error: &Error) -> Option<(&'static str, u16)> {
    match error {
        Error::Protocol { layer, code, .. } => Some((*layer, *code)),
        _ => None,
    }
}

fn full_stack() -> ProtocolStack {
    ProtocolStack::new()
        .with_layer(SequenceLayer)
        .with_layer(CompressionLayer::new(CompressionKind::Lz4, 16, 1 << 20))
        .with_layer(FramingLayer::default())
}

// ============================================================================
// STACK SHAPES
// ============================================================================

#[test]
fn test_empty_stack_treats_input_as_one_packet() {
    let stack = ProtocolStack::new();
    let packet = Packet::new(SessionId(9), 42, b"plain".to_vec());
    let wire = stack.encode(&packet, &mut session()).unwrap();
    assert_eq!(wire, packet.to_bytes());

    let (decoded, consumed) = expect_packet(stack.decode(&wire, &mut session()).unwrap());
    assert_eq!(decoded, packet);
    assert_eq!(consumed, wire.len());
}

#[test]
fn test_single_layer_stack() {
    let stack = ProtocolStack::new().with_layer(FramingLayer::default());
    let packet = Packet::new(SessionId(9), 1, vec![0xEE; 100]);
    let wire = stack.encode(&packet, &mut session()).unwrap();
    assert_eq!(wire.len(), 6 + 4 + 100);
    assert_eq!(&wire[..2], &FRAME_MAGIC.to_be_bytes());

    let (decoded, _) = expect_packet(stack.decode(&wire, &mut session()).unwrap());
    assert_eq!(decoded, packet);
}

#[test]
fn test_three_layer_stack_across_split_reads() {
    let stack = full_stack();
    let mut tx = session();
    let mut rx = session();
    let packet = Packet::new(SessionId(9), 7, b"a fairly repetitive payload ".repeat(20));
    let wire = stack.encode(&packet, &mut tx).unwrap();

    let half = wire.len() / 2;
    assert!(matches!(
        stack.decode(&wire[..half], &mut rx).unwrap(),
        StackDecode::Incomplete { needed: Some(n) } if n == wire.len()
    ));

    let (decoded, consumed) = expect_packet(stack.decode(&wire, &mut rx).unwrap());
    assert_eq!(decoded, packet);
    assert_eq!(consumed, wire.len());
}

#[test]
fn test_back_to_back_frames_decode_one_at_a_time() {
    let stack = full_stack();
    let mut tx = session();
    let mut rx = session();

    let mut wire = Vec::new();
    for opcode in 0..3u32 {
        let packet = Packet::new(SessionId(9), opcode, vec![opcode as u8; 40]);
        wire.extend(stack.encode(&packet, &mut tx).unwrap());
    }

    let mut offset = 0;
    for opcode in 0..3u32 {
        let (decoded, consumed) = expect_packet(stack.decode(&wire[offset..], &mut rx).unwrap());
        assert_eq!(decoded.opcode, opcode);
        offset += consumed;
    }
    assert_eq!(offset, wire.len());
}

// ============================================================================
// FRAMING
// ============================================================================

#[test]
fn test_header_announcing_more_than_available() {
    let stack = ProtocolStack::new().with_layer(FramingLayer::default());
    let mut raw = Vec::new();
    raw.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
    raw.extend_from_slice(&1000u32.to_be_bytes());
    raw.extend_from_slice(&[0u8; 4]);
    assert_eq!(raw.len(), 10);

    let decoded = stack.decode(&raw, &mut session()).unwrap();
    assert_eq!(decoded, StackDecode::Incomplete { needed: Some(1006) });
}

#[test]
fn test_partial_header_is_incomplete() {
    let stack = ProtocolStack::new().with_layer(FramingLayer::default());
    for len in 0..6 {
        let raw = &FRAME_MAGIC.to_be_bytes().repeat(3)[..len];
        let decoded = stack.decode(raw, &mut session()).unwrap();
        assert_eq!(decoded, StackDecode::Incomplete { needed: Some(6) }, "len {len}");
    }
}

#[test]
fn test_bad_magic_rejected_early() {
    let stack = ProtocolStack::new().with_layer(FramingLayer::default());
    let err = stack.decode(&[0xDE, 0xAD], &mut session()).unwrap_err();
    assert_eq!(protocol_code(&err), Some(("framing", codes::BAD_MAGIC)));
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn test_oversized_announcement_rejected() {
    let stack = ProtocolStack::new().with_layer(FramingLayer::new(1024));
    let mut raw = FRAME_MAGIC.to_be_bytes().to_vec();
    raw.extend_from_slice(&4096u32.to_be_bytes());

    let err = stack.decode(&raw, &mut session()).unwrap_err();
    assert_eq!(protocol_code(&err), Some(("framing", codes::OVERSIZED)));
}

#[test]
fn test_oversized_send_rejected() {
    let stack = ProtocolStack::new().with_layer(FramingLayer::new(16));
    let packet = Packet::new(SessionId(9), 0, vec![0; 64]);
    let err = stack.encode(&packet, &mut session()).unwrap_err();
    assert_eq!(err.layer(), Some("framing"));
}

// ============================================================================
// STATEFUL AND SEALED LAYERS
// ============================================================================

#[test]
fn test_replayed_frame_is_a_sequence_gap() {
    let stack = full_stack();
    let mut tx = session();
    let mut rx = session();
    let wire = stack
        .encode(&Packet::new(SessionId(9), 1, vec![1, 2, 3]), &mut tx)
        .unwrap();

    expect_packet(stack.decode(&wire, &mut rx).unwrap());
    let err = stack.decode(&wire, &mut rx).unwrap_err();
    assert_eq!(protocol_code(&err), Some(("sequence", codes::SEQUENCE_GAP)));
}

#[test]
fn test_session_state_reset_restarts_sequence() {
    let stack = ProtocolStack::new().with_layer(SequenceLayer);
    let mut tx = session();
    let first = stack.encode(&Packet::new(SessionId(9), 0, vec![]), &mut tx).unwrap();
    tx.reset();
    let again = stack.encode(&Packet::new(SessionId(9), 0, vec![]), &mut tx).unwrap();
    assert_eq!(first, again);
}

#[test]
fn test_cipher_with_wrong_key_fails_to_open() {
    let config = StackConfig::default();
    let mut key_a = Crypto::generate_key();
    let mut key_b = Crypto::generate_key();
    let sender = ProtocolStack::from_config_with_cipher(&config, &mut key_a);
    let receiver = ProtocolStack::from_config_with_cipher(&config, &mut key_b);

    let wire = sender
        .encode(&Packet::new(SessionId(9), 5, b"secret".to_vec()), &mut session())
        .unwrap();
    assert!(!wire.windows(6).any(|w| w == b"secret"));

    let err = receiver.decode(&wire, &mut session()).unwrap_err();
    assert_eq!(protocol_code(&err), Some(("cipher", codes::DECRYPT)));
}

#[test]
fn test_packet_shorter_than_opcode() {
    let stack = ProtocolStack::new();
    let err = stack.decode(&[1, 2], &mut session()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Limit);
}

// ============================================================================
// STREAM EDGE CASES
// ============================================================================

#[test]
fn test_negative_length_header() {
    let mut stream = Stream::new();
    stream.write(-1i32);
    stream.write_raw(&[0; 16]);

    let mut reader = Stream::from_vec(stream.into_vec());
    let err = reader.read_buffer().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Limit);
    assert_eq!(reader.pos(), 0);
}

#[test]
fn test_invalid_utf8_string() {
    let mut stream = Stream::new();
    stream.write_buffer(&[0xFF, 0xFE]).unwrap();

    let mut reader = Stream::from_vec(stream.into_vec());
    let err = reader.read_string().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert_eq!(reader.pos(), 0);
}

#[test]
fn test_containers_cannot_be_read_back() {
    let mut stream = Stream::new();
    stream
        .write_value(&Value::List(vec![Value::Int32(1), Value::Bool(true)]))
        .unwrap();

    let mut reader = Stream::from_vec(stream.into_vec());
    let err = reader.read_value(ValueKind::List).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented);
    assert_eq!(reader.read::<i32>().unwrap(), 2);
}

#[test]
fn test_cursor_bounds() {
    let mut stream = Stream::from_vec(vec![1, 2, 3]);
    assert!(stream.set_pos(3).is_ok());
    assert_eq!(stream.remaining(), 0);
    assert_eq!(stream.set_pos(4).unwrap_err().kind(), ErrorKind::Limit);
    assert_eq!(stream.pos(), 3);
}

#[test]
fn test_resize_only_grows() {
    let mut stream = Stream::with_capacity(64);
    assert!(stream.resize(32).is_err());
    stream.resize(4096).unwrap();
    assert!(stream.capacity() >= 4096);
}
