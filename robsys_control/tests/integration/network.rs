//! Localhost TCP/UDP channel tests.
//!
//! Channels bind port 0 on 127.0.0.1; reads are polled with a deadline
//! since loopback delivery is asynchronous.

use robsys_common::protocol::MAX_MESSAGE_LENGTH;
use robsys_control::transport::{self, Channel, ChannelRole, Message, TransportError};
use std::io::{Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::time::{Duration, Instant};

const DEADLINE: Duration = Duration::from_secs(2);

fn poll(channel: &mut dyn Channel) -> Option<Message> {
    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        if let Some(message) = channel.try_read() {
            return Some(message);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    None
}

fn open_local(role: ChannelRole) -> Box<dyn Channel> {
    transport::open(role, Some("127.0.0.1"), 0).expect("bind localhost")
}

#[test]
fn udp_request_reply() {
    let mut channel = open_local(ChannelRole::Datagram);
    let server = channel.local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.set_read_timeout(Some(DEADLINE)).unwrap();
    client.send_to(&[1, 2, 3], server).unwrap();

    let message = poll(channel.as_mut()).expect("datagram");
    assert_eq!(message.as_slice(), &[1, 2, 3]);

    // The sender is now a peer.
    channel.write(&[9, 8]).unwrap();
    let mut buf = [0u8; 16];
    let (n, from) = client.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], &[9, 8]);
    assert_eq!(from, server);
}

#[test]
fn udp_oversized_datagram_discarded() {
    let mut channel = open_local(ChannelRole::Datagram);
    let server = channel.local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(&[0xAA; MAX_MESSAGE_LENGTH + 10], server).unwrap();
    client.send_to(&[0x01], server).unwrap();

    let message = poll(channel.as_mut()).expect("small datagram");
    assert_eq!(message.as_slice(), &[0x01]);
}

#[test]
fn udp_write_without_peers_is_silent() {
    let mut channel = open_local(ChannelRole::Datagram);
    assert!(channel.try_read().is_none());
    assert!(channel.write(&[1]).is_ok());
    assert!(matches!(
        channel.write(&[0; MAX_MESSAGE_LENGTH + 1]),
        Err(TransportError::Oversized(_))
    ));
}

#[test]
fn tcp_request_reply() {
    let mut channel = open_local(ChannelRole::Reliable);
    let server = channel.local_addr().unwrap();

    let mut client = TcpStream::connect(server).unwrap();
    client.set_read_timeout(Some(DEADLINE)).unwrap();
    client.write_all(&[0x02]).unwrap();

    let message = poll(channel.as_mut()).expect("request");
    assert_eq!(message.as_slice(), &[0x02]);

    channel.write(&[0x02]).unwrap();
    let mut buf = [0u8; 4];
    let n = client.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], &[0x02]);
}

#[test]
fn tcp_replies_broadcast_and_stalled_client_dropped() {
    let mut channel = open_local(ChannelRole::Reliable);
    let server = channel.local_addr().unwrap();

    let mut reader = TcpStream::connect(server).unwrap();
    reader.set_read_timeout(Some(DEADLINE)).unwrap();
    let mut stalled = TcpStream::connect(server).unwrap();
    stalled.set_read_timeout(Some(DEADLINE)).unwrap();

    // Request from the reader; the stalled client sees the reply too.
    reader.write_all(&[0x01]).unwrap();
    assert_eq!(poll(channel.as_mut()).unwrap().as_slice(), &[0x01]);
    channel.write(&[0x01]).unwrap();
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf).unwrap();
    stalled.read_exact(&mut buf).unwrap();
    assert_eq!(buf, [0x01]);

    // Fill the stalled client's buffers while the reader keeps up.
    let message = [0xC3u8; MAX_MESSAGE_LENGTH];
    let total = 100_000;
    let mut frame = vec![0u8; MAX_MESSAGE_LENGTH];
    for _ in 0..total {
        channel.write(&message).unwrap();
        reader.read_exact(&mut frame).unwrap();
        assert_eq!(frame, message);
    }

    // The stalled client was disconnected long before the last write.
    let mut received = 0usize;
    let mut sink = vec![0u8; 64 * 1024];
    loop {
        match stalled.read(&mut sink) {
            Ok(0) => break,
            Ok(n) => received += n,
            Err(e) => panic!("stalled client never disconnected: {e}"),
        }
    }
    assert!(received < total * MAX_MESSAGE_LENGTH);
}

#[test]
fn tcp_close_releases_listener() {
    let mut channel = open_local(ChannelRole::Reliable);
    let server = channel.local_addr().unwrap();
    channel.close();

    assert!(channel.local_addr().is_none());
    assert!(matches!(channel.write(&[0]), Err(TransportError::Closed)));
    assert!(TcpStream::connect(server).is_err());
}

#[test]
fn second_bind_on_same_port_fails() {
    let channel = open_local(ChannelRole::Datagram);
    let port = channel.local_addr().unwrap().port();

    let result = transport::open(ChannelRole::Datagram, Some("127.0.0.1"), port);
    assert!(matches!(result, Err(TransportError::Bind { .. })));
}
