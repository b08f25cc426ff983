//     1          2          3
// ----------|----------|----------
//        RCV.NXT    RCV.NXT
//                  +RCV.WND
//
// 1 - old sequence numbers which have been acknowledged
// 2 - sequence numbers allowed for new reception
// 3 - future sequence numbers which are not yet allowed
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct ReceiveSequenceSpace {
    /// Initial receive sequence number
    pub irs: u32,
    /// Next sequence number expected on an incoming segment; the lower
    /// edge of the receive window
    pub nxt: u32,
    /// The number of bytes we are willing to buffer from the remote
    /// TCP. Fits in 16 bits.
    pub wnd: u32,
    /// Urgent pointer; carried but not interpreted
    pub up: u32,
}

impl ReceiveSequenceSpace {
    /// Reinitializes the space around the remote's initial sequence
    /// number. Consuming the SYN advances `nxt` past `irs`.
    pub fn reset(&mut self, local_wnd: u32, irs: u32) {
        *self = Self {
            irs,
            nxt: irs,
            wnd: local_wnd,
            ..Default::default()
        };
    }
}
