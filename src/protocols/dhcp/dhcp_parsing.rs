use super::OptionCode;
use crate::protocols::ethernet::MacAddress;
use crate::protocols::ipv4::Ipv4Address;
use crate::protocols::utility::BytesExt;
use thiserror::Error as ThisError;

/// The four-byte constant separating the fixed BOOTP portion from the
/// options.
const MAGIC_COOKIE: u32 = 0x63825363;

/// Value of the `op` field for a client-to-server message
const OP_REQUEST: u8 = 1;
/// Value of the `op` field for a server-to-client message
const OP_REPLY: u8 = 2;

/// An enumeration representing the specific type or functionality of
/// a DHCP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover = 1,
    Offer,
    Request,
    Decline,
    Ack,
    Nack,
    Release,
}

impl TryFrom<u8> for MessageType {
    type Error = ParseError;

    fn try_from(msg_type: u8) -> Result<Self, ParseError> {
        Ok(match msg_type {
            1 => MessageType::Discover,
            2 => MessageType::Offer,
            3 => MessageType::Request,
            4 => MessageType::Decline,
            5 => MessageType::Ack,
            6 => MessageType::Nack,
            7 => MessageType::Release,
            _ => return Err(ParseError::InvalidDhcpType),
        })
    }
}

impl MessageType {
    /// Whether the message travels from client to server.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            MessageType::Discover
                | MessageType::Request
                | MessageType::Decline
                | MessageType::Release
        )
    }
}

/// A DHCP message: the fixed BOOTP portion plus the options the codec
/// interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhcpMessage {
    /// Number of relays the message has passed through
    pub hops: u8,
    /// Correlates requests with responses
    pub transaction_id: u32,
    /// Seconds since the client began acquiring an address
    pub seconds: u16,
    /// Whether the server should answer by hardware broadcast
    pub broadcast: bool,
    /// Filled by a client that already has an address
    pub client_ip: Ipv4Address,
    /// The address the server is granting
    pub your_ip: Ipv4Address,
    /// The server to use in the next step of the exchange
    pub server_ip: Ipv4Address,
    /// Filled by the first relay agent on the path
    pub relay_ip: Ipv4Address,
    /// The client's hardware address
    pub client_mac: MacAddress,
    /// What kind of exchange step this message is
    pub msg_type: MessageType,
    /// Option 50, the address the client asks for
    pub requested_ip: Option<Ipv4Address>,
    /// Option 54, the server the client is talking to
    pub server_identifier: Option<Ipv4Address>,
}

impl DhcpMessage {
    pub fn new(msg_type: MessageType, transaction_id: u32, client_mac: MacAddress) -> Self {
        Self {
            hops: 0,
            transaction_id,
            seconds: 0,
            broadcast: false,
            client_ip: Ipv4Address::CURRENT_NETWORK,
            your_ip: Ipv4Address::CURRENT_NETWORK,
            server_ip: Ipv4Address::CURRENT_NETWORK,
            relay_ip: Ipv4Address::CURRENT_NETWORK,
            client_mac,
            msg_type,
            requested_ip: None,
            server_identifier: None,
        }
    }

    /// Parses a message from a byte iterator.
    pub fn from_bytes(mut bytes: impl Iterator<Item = u8>) -> Result<Self, ParseError> {
        const HTS: ParseError = ParseError::HeaderTooShort;

        let op = bytes.next_u8().ok_or(HTS)?;
        if op != OP_REQUEST && op != OP_REPLY {
            return Err(ParseError::InvalidOperation);
        }
        let htype = bytes.next_u8().ok_or(HTS)?;
        let hlen = bytes.next_u8().ok_or(HTS)?;
        if htype != 1 || hlen != 6 {
            return Err(ParseError::UnsupportedHardware);
        }
        let hops = bytes.next_u8().ok_or(HTS)?;
        let transaction_id = bytes.next_u32_be().ok_or(HTS)?;
        let seconds = bytes.next_u16_be().ok_or(HTS)?;
        let flags = bytes.next_u16_be().ok_or(HTS)?;
        let client_ip = bytes.next_ipv4addr().ok_or(HTS)?;
        let your_ip = bytes.next_ipv4addr().ok_or(HTS)?;
        let server_ip = bytes.next_ipv4addr().ok_or(HTS)?;
        let relay_ip = bytes.next_ipv4addr().ok_or(HTS)?;
        let client_mac = bytes.next_mac().ok_or(HTS)?;
        // The rest of chaddr, then sname and file, all unused here.
        bytes.nth(10 + 64 + 128 - 1).ok_or(HTS)?;

        if bytes.next_u32_be().ok_or(HTS)? != MAGIC_COOKIE {
            return Err(ParseError::BadMagicCookie);
        }

        let mut msg_type = None;
        let mut requested_ip = None;
        let mut server_identifier = None;
        loop {
            let code = bytes.next_u8().ok_or(HTS)?;
            if code == OptionCode::End as u8 {
                break;
            }
            if code == OptionCode::WordAligned as u8 {
                continue;
            }
            let length = bytes.next_u8().ok_or(HTS)?;
            match code {
                c if c == OptionCode::MessageType as u8 => {
                    if length != 1 {
                        return Err(ParseError::BadOptionLength);
                    }
                    msg_type = Some(MessageType::try_from(bytes.next_u8().ok_or(HTS)?)?);
                }
                c if c == OptionCode::RequestedIpAddress as u8 => {
                    if length != 4 {
                        return Err(ParseError::BadOptionLength);
                    }
                    requested_ip = Some(bytes.next_ipv4addr().ok_or(HTS)?);
                }
                c if c == OptionCode::ServerIdentification as u8 => {
                    if length != 4 {
                        return Err(ParseError::BadOptionLength);
                    }
                    server_identifier = Some(bytes.next_ipv4addr().ok_or(HTS)?);
                }
                _ => {
                    // Skip options we do not interpret.
                    if length > 0 {
                        bytes.nth(length as usize - 1).ok_or(HTS)?;
                    }
                }
            }
        }

        Ok(Self {
            hops,
            transaction_id,
            seconds,
            broadcast: flags & 0x8000 != 0,
            client_ip,
            your_ip,
            server_ip,
            relay_ip,
            client_mac,
            msg_type: msg_type.ok_or(ParseError::MissingMessageType)?,
            requested_ip,
            server_identifier,
        })
    }

    /// Creates the serialized message.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(240 + 16);
        out.push(if self.msg_type.is_request() {
            OP_REQUEST
        } else {
            OP_REPLY
        });
        out.push(1);
        out.push(6);
        out.push(self.hops);
        out.extend_from_slice(&self.transaction_id.to_be_bytes());
        out.extend_from_slice(&self.seconds.to_be_bytes());
        out.extend_from_slice(&if self.broadcast { 0x8000u16 } else { 0 }.to_be_bytes());
        out.extend_from_slice(&self.client_ip.to_bytes());
        out.extend_from_slice(&self.your_ip.to_bytes());
        out.extend_from_slice(&self.server_ip.to_bytes());
        out.extend_from_slice(&self.relay_ip.to_bytes());
        out.extend_from_slice(&self.client_mac.to_bytes());
        out.extend_from_slice(&[0; 10 + 64 + 128]);
        out.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());

        out.extend_from_slice(&[OptionCode::MessageType as u8, 1, self.msg_type as u8]);
        if let Some(requested) = self.requested_ip {
            out.push(OptionCode::RequestedIpAddress as u8);
            out.push(4);
            out.extend_from_slice(&requested.to_bytes());
        }
        if let Some(server) = self.server_identifier {
            out.push(OptionCode::ServerIdentification as u8);
            out.push(4);
            out.extend_from_slice(&server.to_bytes());
        }
        out.push(OptionCode::End as u8);
        out
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("The DHCP message is incomplete")]
    HeaderTooShort,
    #[error("The op field is neither request nor reply")]
    InvalidOperation,
    #[error("Only Ethernet client hardware is supported")]
    UnsupportedHardware,
    #[error("The options do not start with the magic cookie")]
    BadMagicCookie,
    #[error("Unknown DHCP message type")]
    InvalidDhcpType,
    #[error("An option's length disagrees with its type")]
    BadOptionLength,
    #[error("The message carries no message type option")]
    MissingMessageType,
}
