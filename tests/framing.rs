//! Blocking frame I/O, byte layout and the writer transport.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use nodegraph_sync::core::frame::{read_frame, write_frame, PacketId, RawFrame, HEADER_LEN};
use nodegraph_sync::protocol::{
    DisconnectPacket, Endpoint, GraphListRequestPacket, Packet, Payload, Protocol, Role,
};
use nodegraph_sync::transport::{PeerId, Transport, WriterTransport};
use nodegraph_sync::ProtocolError;

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_empty_group_request_wire_layout() {
    let protocol = Protocol::new();
    let packet: Payload = GraphListRequestPacket {
        group: String::new(),
    }
    .into();
    let frame = protocol
        .packets
        .encode(&packet, &protocol.serializers)
        .unwrap();

    let mut wire = Vec::new();
    write_frame(&mut wire, &frame).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(&GraphListRequestPacket::id().0.to_be_bytes());
    expected.extend_from_slice(&4i32.to_be_bytes());
    expected.extend_from_slice(&0i32.to_be_bytes());
    assert_eq!(wire, expected);

    let read = read_frame(&mut Cursor::new(wire), 1024).unwrap().unwrap();
    assert_eq!(read, frame);
    let decoded = protocol
        .packets
        .decode(&read, &protocol.serializers)
        .unwrap();
    assert_eq!(decoded, Some(packet));
}

#[test]
fn test_frames_read_back_in_sequence() {
    let frames: Vec<RawFrame> = (0..5)
        .map(|i| RawFrame::new(PacketId(i), vec![i as u8; i as usize * 3].into()))
        .collect();

    let mut wire = Vec::new();
    for frame in &frames {
        write_frame(&mut wire, frame).unwrap();
    }

    let mut reader = Cursor::new(wire);
    for frame in &frames {
        assert_eq!(read_frame(&mut reader, 1024).unwrap().as_ref(), Some(frame));
    }
    assert_eq!(read_frame(&mut reader, 1024).unwrap(), None);
}

#[test]
fn test_partial_header_ends_stream() {
    let mut reader = Cursor::new(vec![0u8; HEADER_LEN - 1]);
    assert_eq!(read_frame(&mut reader, 1024).unwrap(), None);
}

#[test]
fn test_short_payload_is_malformed() {
    let mut wire = RawFrame::new(PacketId(9), vec![1u8; 32].into())
        .to_bytes()
        .unwrap()
        .to_vec();
    wire.truncate(HEADER_LEN + 10);

    let err = read_frame(&mut Cursor::new(wire), 1024).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::MalformedFrame {
            expected: 32,
            actual: 10
        }
    ));
    assert!(err.is_connection_fatal());
}

#[test]
fn test_oversized_declaration_is_rejected() {
    let wire = RawFrame::new(PacketId(1), vec![0u8; 2048].into())
        .to_bytes()
        .unwrap();
    let err = read_frame(&mut Cursor::new(wire.to_vec()), 1024).unwrap_err();
    assert!(matches!(err, ProtocolError::OversizedPacket(2048)));
}

#[test]
fn test_writer_transport_delivers_whole_frames() {
    let transport = Arc::new(WriterTransport::new());
    let endpoint = Endpoint::new(Role::Server, Arc::new(Protocol::new()), transport.clone());

    let peer = PeerId::random();
    let sink = SharedSink::default();
    transport.attach(peer, sink.clone()).unwrap();
    endpoint.connect(peer).unwrap();

    let packet: Payload = DisconnectPacket {
        reason: "maintenance".into(),
    }
    .into();
    endpoint.send(&packet, peer).unwrap();

    let wire = sink.0.lock().unwrap().clone();
    let frame = read_frame(&mut Cursor::new(wire), 1024).unwrap().unwrap();
    assert_eq!(frame.id, DisconnectPacket::id());
    let protocol = endpoint.protocol();
    assert_eq!(
        protocol
            .packets
            .decode(&frame, &protocol.serializers)
            .unwrap(),
        Some(packet.clone())
    );

    endpoint.disconnect(peer).unwrap();
    assert!(!transport.is_attached(peer));
    assert!(matches!(
        transport.send(peer, bytes::Bytes::new()),
        Err(ProtocolError::UnknownPeer(_))
    ));
    assert!(matches!(
        endpoint.send(&packet, peer),
        Err(ProtocolError::ConnectionClosed)
    ));
}
