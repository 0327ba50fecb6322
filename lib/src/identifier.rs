//! Ring identifiers: hashing endpoints into the 32-bit identifier space and
//! the modular arithmetic used to compare positions on the ring.

use sha1::{Digest, Sha1};
use std::net::SocketAddr;

/// Position on the ring, in `[0, 2^32)`.
pub type RingId = u32;

/// Number of bits in the identifier space, and number of finger table slots.
pub const M: usize = 32;

/// Size of the identifier space, `2^M`.
pub const RING_SIZE: u64 = 1 << M;

/// `POWERS_OF_TWO[k] == 2^k` for every finger exponent.
pub const POWERS_OF_TWO: [RingId; M] = powers_of_two();

// Evaluated at compile time; `k < M` bounds every index.
#[allow(clippy::indexing_slicing)]
const fn powers_of_two() -> [RingId; M] {
    let mut table = [0; M];
    let mut k = 0;
    while k < M {
        table[k] = 1 << k;
        k += 1;
    }
    table
}

/// Maps an endpoint to its identifier. Every node of one ring must agree on it.
pub type IdentifierFn = fn(&SocketAddr) -> RingId;

/// Default identifier function: truncated SHA-1 of the `ip:port` text.
pub fn hash_address(address: &SocketAddr) -> RingId {
    hash_key(&address.to_string())
}

/// First four bytes of the SHA-1 digest, big endian.
pub fn hash_key(key: &str) -> RingId {
    match Sha1::digest(key.as_bytes()).as_slice() {
        [a, b, c, d, ..] => RingId::from_be_bytes([*a, *b, *c, *d]),
        _ => 0,
    }
}

/// Clockwise distance from `origin` to `value`, `(value - origin) mod 2^32`.
pub fn relative_distance(value: RingId, origin: RingId) -> RingId {
    value.wrapping_sub(origin)
}

/// Exponent of the offset covered by a 0-based finger slot.
///
/// Slot `0` is the successor and covers `id + 2^0`; the textbook 1-based slot
/// `i` lives at index `i - 1`.
pub const fn finger_exponent(slot: usize) -> usize {
    slot
}

/// First identifier a finger slot is responsible for: `(node_id + 2^slot) mod 2^32`.
///
/// Slots past the table are clamped to the last one.
pub fn finger_start(node_id: RingId, slot: usize) -> RingId {
    let exponent = finger_exponent(slot).min(M - 1);
    node_id.wrapping_add(POWERS_OF_TWO.get(exponent).copied().unwrap_or(0))
}

/// 8-digit lower-case hex rendering of an identifier.
pub fn to_hex(id: RingId) -> String {
    hex::encode(id.to_be_bytes())
}

/// Position of `id` on the ring as a whole percentage.
pub fn position_percent(id: RingId) -> u64 {
    u64::from(id) * 100 / RING_SIZE
}
