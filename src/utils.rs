use std::collections::VecDeque;
use std::time::Duration;

/// Moves a key to the back of the order queue (marks it most recently used).
///
/// Used by the LRU store when a live entry is served: eviction always takes
/// the front of the queue, so the back is the safest place to be.
///
/// A key that is not present leaves the queue unchanged.
pub(crate) fn move_key_to_back(order: &mut VecDeque<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
        order.push_back(key.to_string());
    }
}

/// Removes a key from the order queue, if present.
pub(crate) fn remove_key(order: &mut VecDeque<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
    }
}

/// Sleeps for a uniformly random duration in `[min, max)`.
///
/// Backoff for the single-flight spin loop: randomization keeps a herd of
/// callers that missed the cache from re-checking in lockstep.
pub(crate) fn sleep_random(min: Duration, max: Duration) {
    let span = (max - min).as_nanos() as u64;
    let jitter = Duration::from_nanos(fastrand::u64(..span.max(1)));
    std::thread::sleep(min + jitter);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn move_existing_key_to_back() {
        let mut order: VecDeque<String> =
            ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        move_key_to_back(&mut order, "b");
        assert_eq!(order, ["a", "c", "b"]);
    }

    #[test]
    fn move_missing_key_is_noop() {
        let mut order: VecDeque<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        move_key_to_back(&mut order, "z");
        assert_eq!(order, ["a", "b"]);
    }

    #[test]
    fn remove_key_drops_only_target() {
        let mut order: VecDeque<String> =
            ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        remove_key(&mut order, "b");
        assert_eq!(order, ["a", "c"]);
        remove_key(&mut order, "b");
        assert_eq!(order, ["a", "c"]);
    }

    #[test]
    fn sleep_random_respects_lower_bound() {
        let start = Instant::now();
        sleep_random(Duration::from_millis(1), Duration::from_millis(3));
        assert!(start.elapsed() >= Duration::from_millis(1));
    }
}
