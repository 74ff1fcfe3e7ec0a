//! Stream lifecycle tests: handshake states, half-close, reset, accept
//! ordering, and stream-ID rules.

use braidstream::frame::{Flags, FrameType, Header};
use braidstream::transport::mem::MemoryTransport;
use braidstream::{Config, ErrorKind, Session, Stream, StreamState, Transport};

fn session_pair() -> (Session, Session, MemoryTransport, MemoryTransport) {
    let (cio, sio) = MemoryTransport::pair();
    let client = Session::client(cio.clone(), Config::default());
    let server = Session::server(sio.clone(), Config::default());
    (client, server, cio, sio)
}

/// Open one stream and run the handshake to completion on both sides.
fn established(client: &Session, server: &Session) -> (Stream, Stream) {
    let stream = client.open_stream().unwrap();
    server.process().unwrap();
    let peer = server.accept_stream().unwrap().expect("stream queued");
    client.process().unwrap();
    (stream, peer)
}

#[test]
fn local_ids_are_parity_correct_and_increasing() {
    let (client, server, _cio, _sio) = session_pair();

    assert_eq!(client.open_stream().unwrap().id(), 1);
    assert_eq!(client.open_stream().unwrap().id(), 3);
    assert_eq!(client.open_stream().unwrap().id(), 5);

    // The server side allocates even IDs.
    assert_eq!(server.open_stream().unwrap().id(), 2);
    assert_eq!(server.open_stream().unwrap().id(), 4);
}

#[test]
fn half_close_then_close() {
    let (client, server, _cio, _sio) = session_pair();
    let (stream, peer) = established(&client, &server);

    // Client half-closes; the server sees EOF once its buffer is empty.
    stream.close(false).unwrap();
    assert_eq!(stream.state(), StreamState::FinSent);

    server.process().unwrap();
    assert_eq!(peer.state(), StreamState::FinRecv);
    let mut buf = [0u8; 16];
    assert_eq!(peer.read(&mut buf).unwrap(), 0);

    // The send half is done on both ends once a FIN has passed.
    let err = peer.write(b"bye").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);

    // Server closes its side; both ends are now fully closed.
    peer.close(false).unwrap();
    assert_eq!(peer.state(), StreamState::Closed);
    client.process().unwrap();
    assert_eq!(stream.state(), StreamState::Closed);

    let err = stream.write(b"too late").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);
}

#[test]
fn reset_closes_both_sides_immediately() {
    let (client, server, _cio, sio) = session_pair();
    let (_s1, _p1) = established(&client, &server);

    // Second stream gets id 3.
    let stream = client.open_stream().unwrap();
    assert_eq!(stream.id(), 3);
    server.process().unwrap();
    client.process().unwrap();
    let peer = server.accept_stream().unwrap().expect("stream queued");

    // Reset emits a single bare DATA frame with RST.
    stream.close(true).unwrap();
    assert_eq!(sio.pending(), 12);
    assert_eq!(stream.state(), StreamState::Closed);

    let err = stream.write(b"x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);

    server.process().unwrap();
    assert_eq!(peer.state(), StreamState::Closed);
}

#[test]
fn reset_abandons_unread_data() {
    let (client, server, _cio, _sio) = session_pair();
    let (stream, peer) = established(&client, &server);

    stream.write(b"in flight").unwrap();
    server.process().unwrap();

    peer.close(true).unwrap();
    client.process().unwrap();
    assert_eq!(stream.state(), StreamState::Closed);

    // The receive buffer was abandoned with the reset.
    let mut buf = [0u8; 16];
    let err = peer.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);
}

#[test]
fn accept_returns_streams_in_syn_order() {
    let (client, server, _cio, _sio) = session_pair();

    let _s1 = client.open_stream().unwrap();
    let _s2 = client.open_stream().unwrap();
    server.process().unwrap();
    server.process().unwrap();

    assert_eq!(server.accept_stream().unwrap().unwrap().id(), 1);
    assert_eq!(server.accept_stream().unwrap().unwrap().id(), 3);
    assert!(server.accept_stream().unwrap().is_none());
}

#[test]
fn accept_on_empty_queue_returns_none() {
    let (_client, server, _cio, _sio) = session_pair();
    assert!(server.accept_stream().unwrap().is_none());
}

#[test]
fn duplicate_syn_is_a_protocol_error() {
    let (client, server, cio, _sio) = session_pair();
    let (_stream, _peer) = established(&client, &server);

    let syn = Header::new(FrameType::WindowUpdate, Flags::SYN, 1, 4);
    let mut raw = cio.clone();
    raw.write(&syn.encode()).unwrap();
    raw.write(&262_144u32.to_be_bytes()).unwrap();

    let err = server.process().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn wrong_parity_syn_is_a_protocol_error() {
    let (_client, server, cio, _sio) = session_pair();

    // A client must open odd IDs; id 4 claims the server's own parity.
    let syn = Header::new(FrameType::WindowUpdate, Flags::SYN, 4, 4);
    let mut raw = cio;
    raw.write(&syn.encode()).unwrap();
    raw.write(&262_144u32.to_be_bytes()).unwrap();

    let err = server.process().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn data_for_unknown_stream_is_rejected() {
    let (_client, server, cio, _sio) = session_pair();

    let data = Header::new(FrameType::Data, Flags::NONE, 99, 0);
    let mut raw = cio;
    raw.write(&data.encode()).unwrap();

    let err = server.process().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStream);
}

#[test]
fn data_after_fin_is_rejected() {
    let (client, server, cio, _sio) = session_pair();
    let (stream, _peer) = established(&client, &server);

    stream.close(false).unwrap();
    server.process().unwrap();

    // More data on the half-closed stream violates the FIN.
    let data = Header::new(FrameType::Data, Flags::NONE, 1, 3);
    let mut raw = cio.clone();
    raw.write(&data.encode()).unwrap();
    raw.write(b"no!").unwrap();

    let err = server.process().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);
}

#[test]
fn backlog_overflow_refuses_with_rst() {
    let (cio, sio) = MemoryTransport::pair();
    let client = Session::client(cio.clone(), Config::default());
    let config = Config {
        accept_backlog: 1,
        ..Config::default()
    };
    let server = Session::server(sio.clone(), config);

    let s1 = client.open_stream().unwrap();
    let s2 = client.open_stream().unwrap();
    server.process().unwrap(); // id 1 queued
    server.process().unwrap(); // id 3 refused, RST sent

    client.process().unwrap(); // SYN+ACK for id 1
    client.process().unwrap(); // RST for id 3
    assert_eq!(s1.state(), StreamState::Established);
    assert_eq!(s2.state(), StreamState::Closed);

    assert_eq!(server.accept_stream().unwrap().unwrap().id(), 1);
    assert!(server.accept_stream().unwrap().is_none());
}

#[test]
fn write_before_handshake_would_block() {
    let (client, _server, _cio, _sio) = session_pair();
    let stream = client.open_stream().unwrap();
    let err = stream.write(b"eager").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WouldBlock);
}

#[test]
fn manual_window_grant_unblocks_writes() {
    let (client, _server, _cio, _sio) = session_pair();
    let stream = client.open_stream().unwrap();

    stream.update_window(100).unwrap();
    assert_eq!(stream.send_window(), 100);
    assert_eq!(stream.write(b"hello").unwrap(), 5);
    assert_eq!(stream.send_window(), 95);
}

#[test]
fn dropping_a_closed_handle_releases_the_stream() {
    let (client, server, _cio, _sio) = session_pair();
    let (stream, _peer) = established(&client, &server);
    assert_eq!(client.num_streams(), 1);

    stream.close(true).unwrap();
    assert_eq!(client.num_streams(), 1);
    drop(stream);
    assert_eq!(client.num_streams(), 0);
}

#[test]
fn window_update_fin_half_closes() {
    let (client, server, cio, _sio) = session_pair();
    let (stream, peer) = established(&client, &server);

    // A FIN may also ride on a window update frame.
    let fin = Header::new(FrameType::WindowUpdate, Flags::FIN, 1, 4);
    let mut raw = cio.clone();
    raw.write(&fin.encode()).unwrap();
    raw.write(&0u32.to_be_bytes()).unwrap();

    server.process().unwrap();
    assert_eq!(peer.state(), StreamState::FinRecv);

    // The server acknowledged with FIN+ACK; a client that had sent its own
    // FIN would complete the close on it.
    assert_eq!(cio.pending(), 16);
    client.process().unwrap();
    assert_eq!(stream.state(), StreamState::Established);
}

#[test]
fn closed_is_absorbing() {
    let (client, server, _cio, sio) = session_pair();
    let (stream, peer) = established(&client, &server);

    stream.close(true).unwrap();
    assert_eq!(stream.state(), StreamState::Closed);
    server.process().unwrap();
    assert_eq!(peer.state(), StreamState::Closed);

    // A late credit grant must not revive the client's closed stream.
    let update = Header::new(FrameType::WindowUpdate, Flags::NONE, 1, 4);
    let mut raw = sio.clone();
    raw.write(&update.encode()).unwrap();
    raw.write(&4096u32.to_be_bytes()).unwrap();
    client.process().unwrap();
    assert_eq!(stream.state(), StreamState::Closed);
}
