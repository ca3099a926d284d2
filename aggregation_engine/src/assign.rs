use crate::interval::Window;
use crate::record::Timestamped;

/// Events of `sorted_events` with `window.start <= timestamp < window.end`.
///
/// The input must already be sorted ascending by timestamp; the returned
/// slice keeps that order. An event on a window's end belongs to the next
/// window.
pub fn assign<'a, E: Timestamped>(sorted_events: &'a [E], window: &Window) -> &'a [E] {
    let lo = sorted_events.partition_point(|e| e.timestamp() < window.start);
    let hi = lo + sorted_events[lo..].partition_point(|e| e.timestamp() < window.end);
    &sorted_events[lo..hi]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::generate;
    use crate::record::fixtures::{at, tx};
    use crate::record::BlockchainEvent;
    use chrono::TimeDelta;

    #[test]
    fn boundary_event_goes_to_next_window() {
        let events = vec![tx(at(0, 0), 1, 1), tx(at(30, 0), 2, 2), tx(at(59, 59), 3, 3)];
        let windows = generate(at(0, 0), at(60, 0), TimeDelta::minutes(30));

        let first = assign(&events, &windows[0]);
        let second = assign(&events, &windows[1]);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].fee, 1);
        assert_eq!(second.iter().map(|e| e.fee).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn every_event_lands_in_exactly_one_window() {
        // irregular spacing, duplicates and boundary hits
        let seconds = [0u32, 0, 59, 60, 61, 179, 180, 180, 301, 599, 600, 1234, 1799];
        let events: Vec<BlockchainEvent> = seconds
            .iter()
            .enumerate()
            .map(|(i, s)| tx(at(s / 60, s % 60), i as u64, i as i64))
            .collect();
        let windows = generate(at(0, 0), at(30, 0), TimeDelta::seconds(60));

        let mut seen: Vec<i64> = Vec::new();
        for window in &windows {
            let slice = assign(&events, window);
            assert!(slice.iter().all(|e| window.contains(e.timestamp)));
            seen.extend(slice.iter().map(|e| e.fee));
        }
        let expected: Vec<i64> = (0..events.len() as i64).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn empty_range_returns_empty_slice() {
        let events = vec![tx(at(0, 0), 1, 1)];
        let windows = generate(at(10, 0), at(20, 0), TimeDelta::minutes(5));
        assert!(assign(&events, &windows[0]).is_empty());
        assert!(assign::<BlockchainEvent>(&[], &windows[1]).is_empty());
    }
}
