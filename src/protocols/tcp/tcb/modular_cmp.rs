//! Comparisons over the 32-bit sequence number space, which wraps.

/// a < b under modular arithmetic
pub fn mod_le(a: u32, b: u32) -> bool {
    // k is on the opposite side of the ring of integers mod 32 from b
    let k = b.wrapping_add(u32::MAX / 2);

    // There are six cases:
    //  0123456789
    // |a b    k  | a<b, a<k, b<k -> a<b
    // |a k    b  | a<b, a<k, b>k -> a>b
    // |  b a  k  | a>b, a<k, b<k -> a>b
    // |  k a  b  | a<b, a>k, b>k -> a<b
    // |  b    k a| a>b, a>k, b<k -> a<b
    // |  k    b a| a>b, a>k, b>k -> a>b

    (a < b) ^ (a < k) ^ (b < k)
}

/// a <= b under modular arithmetic
pub fn mod_leq(a: u32, b: u32) -> bool {
    mod_le(a, b.wrapping_add(1))
}

/// Is `b` between `a` and `c` when accounting for modular arithmetic?
pub fn mod_bounded(a: u32, ab_cmp: ModCmp, b: u32, bc_cmp: ModCmp, c: u32) -> bool {
    let a = a.wrapping_sub(ab_cmp.offset());
    let c = c.wrapping_add(bc_cmp.offset());

    // a < b < c holds under the following conditions:
    // j: | a b c |
    // k: | c a b |
    // l: | b c a |

    let j = a < b && b < c && a < c;
    let k = a < b && b > c && a > c;
    let l = a > b && b < c && a > c;
    j || k || l
}

pub use ModCmp::*;
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModCmp {
    Le,
    Leq,
}

impl ModCmp {
    pub fn offset(self) -> u32 {
        match self {
            Le => 0,
            Leq => 1,
        }
    }
}

/// The number of sequence numbers covered by the half-open interval
/// `[a, b)`, accounting for wraparound.
pub fn seq_size(a: u32, b: u32) -> u32 {
    b.wrapping_sub(a)
}

/// Whether `seq` lies in the half-open window `[start, start + width)`
/// considered modulo 2^32. An empty window contains nothing.
pub fn in_window(seq: u32, start: u32, width: u32) -> bool {
    width > 0 && seq_size(start, seq) < width
}
