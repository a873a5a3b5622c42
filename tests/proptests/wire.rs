// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Property-Based Tests: Wire Codec
//!
//! # Coverage
//!
//! - **Time code:** decoding an encoded interval never undershoots it, and the
//!   decoded value is non-decreasing in the input.
//! - **Round trip:** any packet built from valid fields decodes to itself.
//! - **Arbitrary bytes:** the decoder returns `Ok` or `Err` for any input and
//!   never panics or reads past the declared length.

use std::net::Ipv4Addr;

use aimf::protocols::wire::{
    emf_to_seconds, seconds_to_emf, Hello, HelloAssociation, Message, MessageBody,
    MessageHeader, Packet, MESSAGE_HEADER_SIZE, TIME_CODE_MAX_SECS, TIME_CODE_UNIT,
};
use proptest::prelude::*;

fn arb_ipv4() -> impl Strategy<Value = Ipv4Addr> {
    any::<u32>().prop_map(Ipv4Addr::from)
}

fn arb_hello() -> impl Strategy<Value = Hello> {
    (
        any::<u8>(),
        0u8..=7,
        prop::collection::vec((arb_ipv4(), arb_ipv4()), 0..16),
    )
        .prop_map(|(htime, willingness, pairs)| Hello {
            htime,
            willingness,
            associations: pairs
                .into_iter()
                .map(|(group, source)| HelloAssociation { group, source })
                .collect(),
        })
}

fn arb_hello_message() -> impl Strategy<Value = Message> {
    (arb_ipv4(), any::<u8>(), any::<u8>(), any::<u16>(), arb_hello()).prop_map(
        |(originator, vtime, ttl, seq, hello)| Message::hello(originator, vtime, ttl, seq, hello),
    )
}

fn arb_unknown_message() -> impl Strategy<Value = Message> {
    (
        2u8..=255,
        arb_ipv4(),
        any::<u8>(),
        any::<u16>(),
        prop::collection::vec(any::<u8>(), 0..32),
    )
        .prop_map(|(message_type, originator, ttl, seq, payload)| Message {
            header: MessageHeader {
                message_type,
                vtime: 0,
                message_size: (MESSAGE_HEADER_SIZE + payload.len()) as u16,
                originator,
                ttl,
                sequence_number: seq,
            },
            body: MessageBody::Unknown(payload),
        })
}

fn arb_packet() -> impl Strategy<Value = Packet> {
    (
        any::<u16>(),
        prop::collection::vec(
            prop_oneof![3 => arb_hello_message(), 1 => arb_unknown_message()],
            0..6,
        ),
    )
        .prop_map(|(seq, messages)| Packet::new(seq, messages))
}

proptest! {
    #[test]
    fn test_time_code_never_undershoots(seconds in TIME_CODE_UNIT..=TIME_CODE_MAX_SECS) {
        let decoded = emf_to_seconds(seconds_to_emf(seconds));
        prop_assert!(decoded >= seconds, "{} decoded as {}", seconds, decoded);
    }

    #[test]
    fn test_time_code_is_monotonic(a in 0.0f64..5000.0, b in 0.0f64..5000.0) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            emf_to_seconds(seconds_to_emf(low)) <= emf_to_seconds(seconds_to_emf(high))
        );
    }

    #[test]
    fn test_packet_round_trip(packet in arb_packet()) {
        let bytes = packet.encode().unwrap();
        prop_assert_eq!(bytes.len(), usize::from(packet.header.packet_length));
        let decoded = Packet::decode(&bytes).unwrap();
        prop_assert_eq!(decoded, packet);
    }

    #[test]
    fn test_trailing_bytes_are_ignored(packet in arb_packet(), junk in prop::collection::vec(any::<u8>(), 1..16)) {
        let mut bytes = packet.encode().unwrap();
        bytes.extend_from_slice(&junk);
        prop_assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_decode_does_not_panic(input in any::<Vec<u8>>()) {
        let _ = Packet::decode(&input);
    }

    #[test]
    fn test_truncation_is_rejected(packet in arb_packet(), cut in 1usize..64) {
        let bytes = packet.encode().unwrap();
        let keep = bytes.len().saturating_sub(cut);
        prop_assert!(Packet::decode(&bytes[..keep]).is_err());
    }

    #[test]
    fn test_hello_payload_must_be_two_plus_8k(extra in 1usize..8, pairs in 0usize..4) {
        let payload = vec![0u8; 2 + 8 * pairs + extra];
        prop_assert!(Hello::parse(&payload).is_err());
    }
}
