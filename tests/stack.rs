//! End-to-end exchanges between whole port stacks, shuttling Ethernet
//! frames through an in-memory pipe the way a test network would.

use portstack::protocols::ethernet::HEADER_OCTETS as ETH_OCTETS;
use portstack::protocols::ipv4::Ipv4Header;
use portstack::protocols::tcp::tcp_parsing::TcpHeader;
use portstack::{
    Endpoint, Flags, Ipv4Address, Iss, MacAddress, PortStack, PortStackConfig, State, TcpHandle,
    TcpSocketConfig,
};

const MTU: usize = 2048;

const CLIENT_PORT: u16 = 1025;
const CLIENT_ISS: u32 = 100;
const SERVER_PORT: u16 = 80;
const SERVER_ISS: u32 = 300;

/// Shuttles frames between stacks: each exchange lets every stack
/// transmit at most one frame, then delivers the frames to everyone
/// else. By convention the client is stack 0 and the server stack 1.
struct Exchanger {
    stacks: Vec<PortStack>,
    pipes: Vec<Vec<u8>>,
}

impl Exchanger {
    fn new(stacks: Vec<PortStack>) -> Self {
        let pipes = vec![Vec::new(); stacks.len()];
        Self { stacks, pipes }
    }

    fn stack(&mut self, index: usize) -> &mut PortStack {
        &mut self.stacks[index]
    }

    /// Generates the in-flight frames, returning how many stacks sent
    /// and the total bytes put on the wire.
    fn handle_tx(&mut self) -> (usize, usize) {
        let mut pkts = 0;
        let mut bytes_sent = 0;
        for (stack, pipe) in self.stacks.iter_mut().zip(&mut self.pipes) {
            let mut frame = vec![0u8; MTU];
            let n = stack.handle_eth(&mut frame).expect("handle_eth");
            pipe.clear();
            pipe.extend_from_slice(&frame[..n]);
            if n > 0 {
                pkts += 1;
                bytes_sent += n;
            }
        }
        (pkts, bytes_sent)
    }

    /// Delivers each in-flight frame to every stack except its sender.
    fn handle_rx(&mut self) {
        for sender in 0..self.stacks.len() {
            if self.pipes[sender].is_empty() {
                continue;
            }
            for receiver in 0..self.stacks.len() {
                if receiver == sender {
                    continue;
                }
                let frame = self.pipes[sender].clone();
                match self.stacks[receiver].recv_eth(&frame) {
                    Ok(()) => {}
                    Err(err) if err.is_drop() => {}
                    Err(err) => panic!("recv[{receiver}]: {err}"),
                }
            }
            self.pipes[sender].clear();
        }
    }

    /// Exchanges packets until no more data is being sent or
    /// `max_exchanges` is reached.
    fn do_exchanges(&mut self, max_exchanges: usize) -> (usize, usize) {
        let mut bytes_sent = 0;
        for done in 0..max_exchanges {
            let (pkts, bytes) = self.handle_tx();
            bytes_sent += bytes;
            if pkts == 0 {
                return (done, bytes_sent);
            }
            self.handle_rx();
        }
        (max_exchanges, bytes_sent)
    }

    /// The control bits of the single TCP segment currently in flight.
    fn in_flight_tcp_flags(&self) -> Flags {
        let pipe = self
            .pipes
            .iter()
            .find(|pipe| !pipe.is_empty())
            .expect("no frame in flight");
        let ip = Ipv4Header::from_bytes(pipe[ETH_OCTETS..].iter().cloned()).expect("ipv4");
        let tcp = TcpHeader::from_bytes(
            pipe[ETH_OCTETS + 20..].iter().cloned(),
            ip.source,
            ip.destination,
        )
        .expect("tcp");
        tcp.ctl
    }
}

fn create_stacks(count: usize) -> Vec<PortStack> {
    (0..count)
        .map(|i| {
            let mut stack = PortStack::new(PortStackConfig {
                mac: MacAddress::new([2, 0, 0, 0, 0, i as u8 + 1]),
                mtu: MTU,
            });
            stack.set_addr(Ipv4Address::new([192, 168, 1, i as u8 + 1]));
            stack
        })
        .collect()
}

/// A client stack dialing a server stack, sockets opened but no
/// segments exchanged yet.
fn create_tcp_pair() -> (Exchanger, TcpHandle, TcpHandle) {
    let mut stacks = create_stacks(2);
    let server_mac = stacks[1].mac();
    let server_endpoint = Endpoint::new(stacks[1].addr(), SERVER_PORT);

    let server = stacks[1].open_tcp(TcpSocketConfig::default());
    stacks[1]
        .listen_tcp(server, SERVER_PORT, Iss::Fixed(SERVER_ISS))
        .expect("listen");

    let client = stacks[0].open_tcp(TcpSocketConfig::default());
    stacks[0]
        .dial_tcp(
            client,
            CLIENT_PORT,
            server_mac,
            server_endpoint,
            Iss::Fixed(CLIENT_ISS),
        )
        .expect("dial");

    (Exchanger::new(stacks), client, server)
}

fn socket_state(egr: &mut Exchanger, stack: usize, handle: TcpHandle) -> State {
    egr.stack(stack).tcp_socket(handle).state()
}

fn socket_read_all(egr: &mut Exchanger, stack: usize, handle: TcpHandle) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = egr.stack(stack).tcp_socket_mut(handle).read(&mut buf);
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[test]
fn tcp_establish() {
    let (mut egr, client, server) = create_tcp_pair();

    // A three-way handshake needs exactly three exchanges to complete.
    let (done, bytes_sent) = egr.do_exchanges(3);
    assert_eq!(done, 3);
    // Ethernet + IPv4 + TCP headers per segment.
    assert!(bytes_sent >= (14 + 20 + 20) * 3, "bytes_sent={bytes_sent}");

    assert_eq!(socket_state(&mut egr, 0, client), State::Established);
    assert_eq!(socket_state(&mut egr, 1, server), State::Established);

    // No duplicate ACKs dribble out afterwards.
    let (_, remnant) = egr.do_exchanges(1);
    assert_eq!(remnant, 0);
}

#[test]
fn tcp_close_no_pending_data() {
    // Walks RFC 9293 Figure 12 (normal close) across the whole stack,
    // checking both peers' states after every frame.
    let (mut egr, client, server) = create_tcp_pair();
    egr.do_exchanges(3);

    egr.stack(0).tcp_socket_mut(client).close().expect("close");

    // Client sends FIN|ACK.
    egr.handle_tx();
    assert_eq!(egr.in_flight_tcp_flags(), Flags::FINACK);
    assert_eq!(socket_state(&mut egr, 0, client), State::FinWait1);
    assert_eq!(socket_state(&mut egr, 1, server), State::Established);

    // Server receives it and goes into CLOSE-WAIT.
    egr.handle_rx();
    assert_eq!(socket_state(&mut egr, 1, server), State::CloseWait);

    // Server acknowledges the FIN.
    egr.handle_tx();
    assert_eq!(egr.in_flight_tcp_flags(), Flags::ACK);
    egr.handle_rx();
    assert_eq!(socket_state(&mut egr, 0, client), State::FinWait2);

    // Server follows with its own FIN|ACK and enters LAST-ACK.
    egr.handle_tx();
    assert_eq!(egr.in_flight_tcp_flags(), Flags::FINACK);
    assert_eq!(socket_state(&mut egr, 1, server), State::LastAck);
    egr.handle_rx();
    assert_eq!(socket_state(&mut egr, 0, client), State::TimeWait);

    // Client sends the final ACK; with nothing further owed the stack
    // collapses TIME-WAIT on the spot.
    egr.handle_tx();
    assert_eq!(egr.in_flight_tcp_flags(), Flags::ACK);
    assert_eq!(socket_state(&mut egr, 0, client), State::Closed);
    egr.handle_rx();
    assert_eq!(socket_state(&mut egr, 1, server), State::Closed);
}

#[test]
fn tcp_send_receive_simplex() {
    let (mut egr, client, server) = create_tcp_pair();
    egr.do_exchanges(3);

    const DATA: &[u8] = b"hello world";
    assert_eq!(
        egr.stack(0).tcp_socket_mut(client).write(DATA).expect("write"),
        DATA.len()
    );
    egr.do_exchanges(2);

    assert_eq!(socket_state(&mut egr, 0, client), State::Established);
    assert_eq!(socket_state(&mut egr, 1, server), State::Established);
    assert_eq!(socket_read_all(&mut egr, 1, server), DATA);
}

#[test]
fn tcp_send_receive_duplex() {
    let (mut egr, client, server) = create_tcp_pair();
    egr.do_exchanges(3);

    for i in 0..32 {
        let cdata = format!("hello server {i}");
        let sdata = format!("hello client {i}");
        egr.stack(0)
            .tcp_socket_mut(client)
            .write(cdata.as_bytes())
            .expect("client write");
        egr.stack(1)
            .tcp_socket_mut(server)
            .write(sdata.as_bytes())
            .expect("server write");

        egr.do_exchanges(2);
        assert_eq!(socket_state(&mut egr, 0, client), State::Established);
        assert_eq!(socket_state(&mut egr, 1, server), State::Established);

        assert_eq!(socket_read_all(&mut egr, 0, client), sdata.as_bytes());
        assert_eq!(socket_read_all(&mut egr, 1, server), cdata.as_bytes());
    }
}

#[test]
fn tcp_chunked_transfer() {
    let (mut egr, client, server) = create_tcp_pair();
    egr.do_exchanges(3);

    let expected: Vec<u8> = (0..8000u32).map(|i| i as u8).collect();
    let mut written = 0;
    let mut received = Vec::new();
    for _ in 0..100 {
        if received.len() == expected.len() {
            break;
        }
        let chunk_end = (written + 1000).min(expected.len());
        written += egr
            .stack(0)
            .tcp_socket_mut(client)
            .write(&expected[written..chunk_end])
            .expect("write");
        egr.do_exchanges(2);
        received.extend(socket_read_all(&mut egr, 1, server));
    }
    assert_eq!(received, expected);
}

#[test]
fn tcp_reopen_after_close() {
    const NEW_ISS: u32 = 1337;
    let (mut egr, client, server) = create_tcp_pair();
    egr.do_exchanges(3);

    egr.stack(0).tcp_socket_mut(client).close().expect("close");
    egr.do_exchanges(4);
    assert_eq!(socket_state(&mut egr, 0, client), State::Closed);
    assert_eq!(socket_state(&mut egr, 1, server), State::Closed);

    // The same sockets come back up on neighboring ports with fresh
    // sequence numbers.
    let server_mac = egr.stack(1).mac();
    let server_endpoint = Endpoint::new(egr.stack(1).addr(), SERVER_PORT + 1);
    egr.stack(1)
        .listen_tcp(server, SERVER_PORT + 1, Iss::Fixed(NEW_ISS + 100))
        .expect("reopen listen");
    egr.stack(0)
        .dial_tcp(
            client,
            CLIENT_PORT + 1,
            server_mac,
            server_endpoint,
            Iss::Fixed(NEW_ISS),
        )
        .expect("reopen dial");

    let (done, _) = egr.do_exchanges(3);
    assert_eq!(done, 3);
    assert_eq!(socket_state(&mut egr, 0, client), State::Established);
    assert_eq!(socket_state(&mut egr, 1, server), State::Established);

    egr.stack(0)
        .tcp_socket_mut(client)
        .write(b"once more")
        .expect("write");
    egr.do_exchanges(2);
    assert_eq!(socket_read_all(&mut egr, 1, server), b"once more");
}

#[test]
fn tcp_port_collision_is_rejected() {
    let mut stacks = create_stacks(1);
    let first = stacks[0].open_tcp(TcpSocketConfig::default());
    stacks[0]
        .listen_tcp(first, SERVER_PORT, Iss::Fixed(1))
        .expect("listen");

    let second = stacks[0].open_tcp(TcpSocketConfig::default());
    let result = stacks[0].listen_tcp(second, SERVER_PORT, Iss::Fixed(2));
    assert!(matches!(
        result,
        Err(portstack::StackError::PortInUse(SERVER_PORT))
    ));
}

#[test]
fn arp_resolution() {
    let mut egr = Exchanger::new(create_stacks(2));
    let target_addr = egr.stack(1).addr();
    let target_mac = egr.stack(1).mac();

    egr.stack(0).arp().begin_resolve(target_addr);

    // Request goes out, reply comes back.
    let (done, bytes_sent) = egr.do_exchanges(2);
    assert_eq!(done, 2);
    // Ethernet header plus 28 ARP octets per packet.
    assert_eq!(bytes_sent, (14 + 28) * 2);

    assert!(!egr.stack(0).arp().is_resolving());
    assert_eq!(egr.stack(0).arp().lookup(target_addr), Some(target_mac));

    // No more data to exchange.
    let (_, remnant) = egr.do_exchanges(1);
    assert_eq!(remnant, 0);
}

#[test]
fn udp_datagram_round_trip() {
    let mut egr = Exchanger::new(create_stacks(2));
    let client_addr = egr.stack(0).addr();
    let client_mac = egr.stack(0).mac();
    let server_addr = egr.stack(1).addr();
    let server_mac = egr.stack(1).mac();

    let client = egr.stack(0).open_udp(68).expect("open 68");
    let server = egr.stack(1).open_udp(67).expect("open 67");

    egr.stack(0).udp_socket_mut(client).send_to(
        Endpoint::new(server_addr, 67),
        server_mac,
        b"discover",
    );
    egr.do_exchanges(1);

    let (from, payload) = egr
        .stack(1)
        .udp_socket_mut(server)
        .recv_from()
        .expect("server datagram");
    assert_eq!(from, Endpoint::new(client_addr, 68));
    assert_eq!(payload, b"discover");

    egr.stack(1)
        .udp_socket_mut(server)
        .send_to(from, client_mac, b"offer");
    egr.do_exchanges(1);

    let (from, payload) = egr
        .stack(0)
        .udp_socket_mut(client)
        .recv_from()
        .expect("client datagram");
    assert_eq!(from, Endpoint::new(server_addr, 67));
    assert_eq!(payload, b"offer");
}
