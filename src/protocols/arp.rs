//! Address resolution for IPv4 over Ethernet: the packet codec and
//! the small cache a host stack needs to answer and issue requests.

pub mod arp_parsing;

pub use arp_parsing::{ArpPacket, Operation};

use super::ethernet::MacAddress;
use super::ipv4::Ipv4Address;
use std::collections::HashMap;

/// Learned address mappings plus at most one resolution in progress.
///
/// Incoming requests addressed to us queue a reply; incoming replies
/// fill the cache. The stack drains the outgoing side one packet at a
/// time with [`ArpCache::take_outgoing`].
#[derive(Debug, Default)]
pub struct ArpCache {
    entries: HashMap<Ipv4Address, MacAddress>,
    resolving: Option<Ipv4Address>,
    probe_sent: bool,
    pending_reply: Option<ArpPacket>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts resolving `ip` unless its mapping is already known. A
    /// request already in progress for another address is replaced;
    /// this cache tracks one resolution at a time. Calling this again
    /// for the same address reissues the probe, which is how a caller
    /// retries a lost one.
    pub fn begin_resolve(&mut self, ip: Ipv4Address) {
        if !self.entries.contains_key(&ip) {
            self.resolving = Some(ip);
            self.probe_sent = false;
        }
    }

    /// The learned hardware address for `ip`, if any.
    pub fn lookup(&self, ip: Ipv4Address) -> Option<MacAddress> {
        self.entries.get(&ip).copied()
    }

    /// Digests one incoming ARP packet on behalf of the interface
    /// `(our_mac, our_ip)`.
    pub fn handle_packet(&mut self, packet: ArpPacket, our_mac: MacAddress, our_ip: Ipv4Address) {
        // Either way the sender's mapping is worth learning.
        self.entries.insert(packet.sender_ip, packet.sender_mac);
        match packet.operation {
            Operation::Request if packet.target_ip == our_ip => {
                self.pending_reply = Some(ArpPacket {
                    operation: Operation::Reply,
                    sender_mac: our_mac,
                    sender_ip: our_ip,
                    target_mac: packet.sender_mac,
                    target_ip: packet.sender_ip,
                });
            }
            Operation::Request => {}
            Operation::Reply => {
                if self.resolving == Some(packet.sender_ip) {
                    self.resolving = None;
                    self.probe_sent = false;
                }
            }
        }
    }

    /// The next ARP packet owed to the wire: a reply we owe a
    /// requester, or the probe for an in-progress resolution. Each
    /// resolution emits its probe once.
    pub fn take_outgoing(
        &mut self,
        our_mac: MacAddress,
        our_ip: Ipv4Address,
    ) -> Option<ArpPacket> {
        if let Some(reply) = self.pending_reply.take() {
            return Some(reply);
        }
        let target_ip = self.resolving.filter(|_| !self.probe_sent)?;
        self.probe_sent = true;
        Some(ArpPacket {
            operation: Operation::Request,
            sender_mac: our_mac,
            sender_ip: our_ip,
            target_mac: MacAddress::default(),
            target_ip,
        })
    }

    /// Whether a resolution is still waiting for its reply.
    pub fn is_resolving(&self) -> bool {
        self.resolving.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUR_MAC: MacAddress = MacAddress::new([2, 0, 0, 0, 0, 1]);
    const OUR_IP: Ipv4Address = Ipv4Address::new([192, 168, 1, 1]);
    const PEER_MAC: MacAddress = MacAddress::new([2, 0, 0, 0, 0, 2]);
    const PEER_IP: Ipv4Address = Ipv4Address::new([192, 168, 1, 2]);

    #[test]
    fn request_and_reply_cycle() {
        let mut sender = ArpCache::new();
        let mut target = ArpCache::new();

        sender.begin_resolve(PEER_IP);
        assert!(sender.is_resolving());
        let probe = sender.take_outgoing(OUR_MAC, OUR_IP).unwrap();
        assert_eq!(probe.operation, Operation::Request);
        assert_eq!(probe.target_ip, PEER_IP);
        // The probe goes out once per resolution.
        assert!(sender.take_outgoing(OUR_MAC, OUR_IP).is_none());

        target.handle_packet(probe, PEER_MAC, PEER_IP);
        // The target learned the requester while forming its reply.
        assert_eq!(target.lookup(OUR_IP), Some(OUR_MAC));
        let reply = target.take_outgoing(PEER_MAC, PEER_IP).unwrap();
        assert_eq!(reply.operation, Operation::Reply);
        assert_eq!(reply.target_mac, OUR_MAC);

        sender.handle_packet(reply, OUR_MAC, OUR_IP);
        assert!(!sender.is_resolving());
        assert_eq!(sender.lookup(PEER_IP), Some(PEER_MAC));
        assert!(sender.take_outgoing(OUR_MAC, OUR_IP).is_none());
    }

    #[test]
    fn requests_for_others_are_ignored() {
        let mut cache = ArpCache::new();
        let probe = ArpPacket {
            operation: Operation::Request,
            sender_mac: PEER_MAC,
            sender_ip: PEER_IP,
            target_mac: MacAddress::default(),
            target_ip: Ipv4Address::new([192, 168, 1, 77]),
        };
        cache.handle_packet(probe, OUR_MAC, OUR_IP);
        assert!(cache.take_outgoing(OUR_MAC, OUR_IP).is_none());
        // The sender was still learned in passing.
        assert_eq!(cache.lookup(PEER_IP), Some(PEER_MAC));
    }

    #[test]
    fn known_addresses_skip_resolution() {
        let mut cache = ArpCache::new();
        let reply = ArpPacket {
            operation: Operation::Reply,
            sender_mac: PEER_MAC,
            sender_ip: PEER_IP,
            target_mac: OUR_MAC,
            target_ip: OUR_IP,
        };
        cache.handle_packet(reply, OUR_MAC, OUR_IP);

        cache.begin_resolve(PEER_IP);
        assert!(!cache.is_resolving());
        assert!(cache.take_outgoing(OUR_MAC, OUR_IP).is_none());
    }
}
