//! Property-based tests for energy counters and carbon traces.

use greenflow_core::clock::Millis;
use greenflow_power::counter::energy_joules;
use greenflow_power::{CarbonFragment, CarbonTrace, EnergyCounter};
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

/// Fragments laid out left to right from (gap, length, intensity) triples.
fn arb_fragments(max_len: usize) -> impl Strategy<Value = Vec<CarbonFragment>> {
    proptest::collection::vec((0..1_000u64, 1..1_000u64, 0.0..500.0f64), 0..=max_len).prop_map(
        |parts| {
            let mut cursor = 0;
            parts
                .into_iter()
                .map(|(gap, len, intensity)| {
                    let start = cursor + gap;
                    cursor = start + len;
                    CarbonFragment {
                        start,
                        end: cursor,
                        intensity,
                    }
                })
                .collect()
        },
    )
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #[test]
    fn counter_is_the_discrete_integral(
        segments in proptest::collection::vec((0..10_000u64, 0.0..5_000.0f64), 1..50),
    ) {
        let mut counter = EnergyCounter::new(0);
        let mut now: Millis = 0;
        let mut expected = 0.0;
        let mut watts = 0.0;
        for (dt, next_watts) in segments {
            let before = counter.total();
            now += dt;
            counter.integrate(watts, now);
            expected += energy_joules(watts, dt);
            prop_assert!(counter.total() >= before);
            watts = next_watts;
        }
        prop_assert!((counter.total() - expected).abs() <= 1e-9 * expected.max(1.0));
        prop_assert_eq!(counter.last_update(), now);
    }

    #[test]
    fn stale_updates_leave_counter_unchanged(
        t in 1..100_000u64,
        earlier in 0..100_000u64,
        watts in 0.0..5_000.0f64,
    ) {
        let mut counter = EnergyCounter::new(0);
        counter.integrate(watts, t);
        let total = counter.total();

        counter.integrate(watts * 2.0, earlier.min(t));

        prop_assert_eq!(counter.total(), total);
        prop_assert_eq!(counter.last_update(), t);
    }

    #[test]
    fn trace_lookup_matches_linear_scan(
        fragments in arb_fragments(20),
        probes in proptest::collection::vec(0..25_000u64, 1..40),
    ) {
        let trace = CarbonTrace::new(fragments.clone()).unwrap();
        for t in probes {
            let expected = fragments
                .iter()
                .find(|f| f.start <= t && t < f.end)
                .map(|f| f.intensity);
            prop_assert_eq!(trace.intensity_at(t), expected);

            let boundary = fragments
                .iter()
                .flat_map(|f| [f.start, f.end])
                .filter(|&b| b > t)
                .min();
            prop_assert_eq!(trace.next_change_after(t), boundary);
        }
    }
}
