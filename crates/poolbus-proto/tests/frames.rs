//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Stream-level parser and codec integration tests."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use poolbus_proto::{
    parse_hex, ChemistryView, ChlorinatorView, FrameKind, FrameParser, ProtocolError,
    RawMessage, ScheduleKind, ScheduleView, StatusView,
};
use proptest::prelude::*;

const MIXED_CAPTURE: &str = include_str!("data/mixed_capture.hex");

const PUMP_STATUS: &str =
    "FF 00 FF A5 00 10 60 07 0F 0A 06 02 02 4A 08 AC 12 00 00 00 0A 00 0F 22 02 8A";

const STREAM: &str = "FF 00 FF A5 1E 0F 10 02 1D 09 1F 00 00 00 00 00 00 00 20 03 00 00 04 3F 3F 00 00 \
     41 3C 00 00 07 00 00 6A B6 00 0D 03 7F FF 00 FF A5 10 0F 10 12 29 02 E3 02 AF 02 EE 02 BC 00 \
     00 00 02 00 00 00 2A 00 04 00 5C 06 05 18 01 90 00 00 00 96 14 00 51 00 00 65 20 3C 01 00 00 \
     00 07 50 FF 00 FF A5 01 0F 10 02 1D 0D 1D 20 00 00 00 00 00 00 00 33 00 00 04 4D 4D 00 00 51 \
     6D 00 00 07 00 00 5E D5 00 0D 04 04";

fn bytes(hex: &str) -> Vec<u8> {
    parse_hex(hex).expect("hex")
}

#[test]
fn captured_stream_yields_three_messages() {
    let messages = FrameParser::new().feed_all(&bytes(STREAM));
    let actions: Vec<u8> = messages.iter().map(RawMessage::action).collect();
    assert_eq!(actions, vec![0x02, 0x12, 0x02]);

    let first = StatusView::new(&messages[0]).expect("status");
    assert_eq!((first.hour(), first.minute()), (9, 31));
    assert_eq!(messages[0].preamble(), Some(0x1E));

    let chem = ChemistryView::new(&messages[1]).expect("chemistry");
    assert_eq!(chem.orp(), 687);

    let last = StatusView::new(&messages[2]).expect("status");
    assert_eq!((last.hour(), last.minute()), (13, 29));
    assert!(last.pool());
}

#[test]
fn byte_at_a_time_matches_bulk_feed() {
    let mut parser = FrameParser::new();
    let mut seen = Vec::new();
    for byte in bytes(STREAM) {
        if let Ok(Some(message)) = parser.feed(byte) {
            seen.push(message);
        }
    }
    assert_eq!(seen, FrameParser::new().feed_all(&bytes(STREAM)));
}

#[test]
fn corrupted_message_is_dropped_and_parser_resynchronises() {
    let mut stream = bytes(STREAM);
    // first data byte of the first status message
    stream[9] ^= 0x01;
    let mut parser = FrameParser::new();
    let mut errors = Vec::new();
    let mut messages = Vec::new();
    for byte in stream {
        match parser.feed(byte) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(err) => errors.push(err),
        }
    }
    assert!(matches!(errors.as_slice(), [ProtocolError::Checksum { .. }]));
    let actions: Vec<u8> = messages.iter().map(RawMessage::action).collect();
    assert_eq!(actions, vec![0x12, 0x02]);
}

#[test]
fn long_mixed_capture_counts() {
    let mut parser = FrameParser::new();
    let mut messages = Vec::new();
    let mut rejected = 0;
    for byte in bytes(MIXED_CAPTURE) {
        match parser.feed(byte) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(_) => rejected += 1,
        }
        messages.extend(std::iter::from_fn(|| parser.next_ready()));
    }
    assert_eq!(rejected, 0);

    let count = |kind: FrameKind| messages.iter().filter(|m| m.kind() == kind).count();
    assert_eq!(count(FrameKind::Primary), 281);
    assert_eq!(count(FrameKind::Secondary), 3);

    let action_count = |action: u8| {
        messages
            .iter()
            .filter(|m| m.kind() == FrameKind::Primary && m.action() == action)
            .count()
    };
    assert_eq!(action_count(0x0B), 36);
    assert_eq!(action_count(0x11), 24);
    assert_eq!(action_count(0x27), 1);

    let chlorinator: Vec<ChlorinatorView> = messages
        .iter()
        .filter(|m| m.kind() == FrameKind::Secondary)
        .map(|m| ChlorinatorView::new(m).expect("chlorinator"))
        .collect();
    assert_eq!(chlorinator[0], ChlorinatorView::SetOutput { percent: 0 });
    assert_eq!(chlorinator[1], ChlorinatorView::SetOutput { percent: 0x50 });
    assert!(matches!(
        chlorinator[2],
        ChlorinatorView::Salinity { ppm: 5150, .. }
    ));
}

#[test]
fn stray_lead_bytes_do_not_hide_next_message() {
    let message = RawMessage::from_wire(&bytes(PUMP_STATUS)).expect("valid");
    for lead in ["10", "FF 00", "10 02", "FF 00 FF A5 00", "10 02 00 01 4C"] {
        let mut stream = bytes(lead);
        stream.extend(bytes(PUMP_STATUS));
        let decoded = FrameParser::new().feed_all(&stream);
        assert_eq!(decoded, vec![message.clone()], "after {lead}");
    }
}

#[test]
fn chlorinator_status_reply_scenario() {
    let messages = FrameParser::new().feed_all(&bytes("10 02 00 01 4C 80 DF 10 03"));
    assert_eq!(messages.len(), 1);
    assert_eq!((messages[0].dest(), messages[0].action()), (0x00, 0x01));
    assert_eq!(
        ChlorinatorView::new(&messages[0]).expect("chlorinator"),
        ChlorinatorView::StatusReply { raw: [0x4C, 0x80] }
    );
}

#[test]
fn schedule_report_scenario() {
    let wire = bytes("FF 00 FF A5 1E 0F 10 11 07 01 06 0A 00 10 00 7F 01 9A");
    let messages = FrameParser::new().feed_all(&wire);
    assert_eq!(messages.len(), 1);
    let msg = &messages[0];
    assert_eq!(msg.kind(), FrameKind::Primary);
    assert_eq!((msg.dest(), msg.source(), msg.action()), (0x0F, 0x10, 0x11));
    assert_eq!(msg.data_len(), 7);
    assert_eq!(msg.checksum(), 0x019A);

    let schedule = ScheduleView::new(msg).expect("schedule");
    assert_eq!(schedule.circuit(), 6);
    assert_eq!(schedule.kind(), ScheduleKind::Normal);
    assert_eq!(schedule.entry().to_string(), "NORMAL,6,10:00,16:00,SMTWRFY");
}

#[test]
fn chlorinator_output_scenario() {
    let messages = FrameParser::new().feed_all(&bytes("10 02 50 11 50 C3 10 03"));
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind(), FrameKind::Secondary);
    assert_eq!(
        ChlorinatorView::new(&messages[0]).expect("chlorinator"),
        ChlorinatorView::SetOutput { percent: 0x50 }
    );
}

#[test]
fn secondary_length_off_by_one_is_rejected() {
    let valid = bytes("10 02 50 11 50 C3 10 03");
    for bad in ["10 02 50 11 50 00 C3 10 03", "10 02 50 11 C3 10 03"] {
        let mut stream = bytes(bad);
        stream.extend_from_slice(&valid);
        let mut parser = FrameParser::new();
        let mut errors = 0;
        let mut messages = Vec::new();
        for byte in stream {
            match parser.feed(byte) {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => {}
                Err(_) => errors += 1,
            }
        }
        assert!(errors >= 1, "{bad} should be rejected");
        assert_eq!(messages.len(), 1, "valid message after {bad} should decode");
        assert_eq!(messages[0].data(), &[0x50]);
    }
}

#[test]
fn mixed_framings_interleave() {
    let mut stream = bytes("10 02 00 12 4C 81 F1 10 03");
    stream.extend(bytes("FF"));
    stream.extend(bytes(PUMP_STATUS));
    stream.extend(bytes("10 02 50 14 00 76 10 03"));
    let kinds: Vec<FrameKind> = FrameParser::new()
        .feed_all(&stream)
        .iter()
        .map(RawMessage::kind)
        .collect();
    assert_eq!(
        kinds,
        vec![FrameKind::Secondary, FrameKind::Primary, FrameKind::Secondary]
    );
}

fn valid_primary() -> impl Strategy<Value = RawMessage> {
    (
        any::<u8>(),
        any::<u8>(),
        any::<u8>(),
        any::<u8>(),
        proptest::collection::vec(any::<u8>(), 0..=50),
    )
        .prop_map(|(pre, dest, src, action, data)| {
            RawMessage::primary(pre, dest, src, action, &data).expect("within limits")
        })
}

proptest! {
    #[test]
    fn arbitrary_bytes_only_yield_checksummed_messages(noise in proptest::collection::vec(any::<u8>(), 0..512)) {
        for message in FrameParser::new().feed_all(&noise) {
            let reparsed = RawMessage::from_wire(&message.to_wire());
            prop_assert_eq!(reparsed, Ok(message));
        }
    }

    #[test]
    fn message_survives_leading_noise(
        noise in proptest::collection::vec(any::<u8>(), 0..256),
        message in valid_primary(),
    ) {
        let mut stream = noise;
        stream.extend(message.to_wire());
        let decoded = FrameParser::new().feed_all(&stream);
        prop_assert_eq!(decoded.last(), Some(&message));
    }
}
