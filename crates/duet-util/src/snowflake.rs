use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch: 2025-01-01T00:00:00Z
const DUET_EPOCH: u64 = 1_735_689_600_000;

const TIMESTAMP_SHIFT: u64 = 22;
const WORKER_SHIFT: u64 = 12;
const WORKER_MASK: u64 = 0x3FF;
const SEQUENCE_MASK: u64 = 0xFFF;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as u64
}

/// Generate a time-ordered id: 42 bits of millisecond timestamp since
/// the custom epoch, 10 bits of worker id, 12 bits of sequence.
pub fn generate(worker_id: u16) -> i64 {
    let timestamp = now_millis().saturating_sub(DUET_EPOCH);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) & SEQUENCE_MASK;
    let id = (timestamp << TIMESTAMP_SHIFT)
        | ((worker_id as u64 & WORKER_MASK) << WORKER_SHIFT)
        | seq;
    id as i64
}

/// Recover the Unix timestamp (ms) an id was minted at.
pub fn timestamp_millis(id: i64) -> u64 {
    ((id as u64) >> TIMESTAMP_SHIFT) + DUET_EPOCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_within_a_burst() {
        let a = generate(1);
        let b = generate(1);
        assert!(b > a);
    }

    #[test]
    fn timestamp_round_trips() {
        let before = now_millis();
        let id = generate(0);
        let ts = timestamp_millis(id);
        assert!(ts >= before && ts <= before + 1_000);
    }
}
