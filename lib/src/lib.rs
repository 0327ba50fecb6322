// Shared Rust library
pub mod identifier;
pub mod metrics;
pub mod protocol;

use identifier::{relative_distance, RingId, RING_SIZE};

// Clockwise span from `start` to `end`. `start == end` covers the whole ring.
fn span(start: RingId, end: RingId) -> u64 {
    match relative_distance(end, start) {
        0 => RING_SIZE,
        d => u64::from(d),
    }
}

// Checks if an ID is strictly between two other IDs in the circular ID space.
// `id` is in `(start, end)` going clockwise; `start == end` means every ID except `start`.
pub fn in_open(id: RingId, start: RingId, end: RingId) -> bool {
    let offset = u64::from(relative_distance(id, start));
    offset > 0 && offset < span(start, end)
}

// `id` is in `(start, end]` going clockwise; `start == end` means the whole ring.
pub fn in_half_open(id: RingId, start: RingId, end: RingId) -> bool {
    let offset = match relative_distance(id, start) {
        0 => RING_SIZE,
        d => u64::from(d),
    };
    offset <= span(start, end)
}
