//! Failover detection state machine
//!
//! One `GroupState` per monitored group, keyed by namespace. Each polling
//! tick feeds the latest reported master address in; a change arms a
//! suspected-failover episode, and the episode is confirmed once the same
//! candidate address has been seen `stable_threshold` times in a row.
//!
//! Sentinels can report conflicting master views for a few hundred
//! milliseconds while an election settles, so a single differing reading is
//! not enough evidence of a completed failover. The debounce adds a constant
//! `(threshold - 1) * poll_interval` to every measured duration.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// One polling tick's worth of signal for a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The sentinel answered with a master address.
    Master(String),
    /// The query failed; nothing to feed the state machine this tick.
    NoSignal,
}

/// Per-group detection state.
///
/// Invariant: `stable_count > 0` and `candidate_master` set exactly while
/// `in_failover` is true, and `failover_start` is set once per episode.
#[derive(Debug, Clone, Default)]
struct GroupState {
    /// Last confirmed-stable master address; `None` until first seen.
    last_master: Option<String>,
    in_failover: bool,
    /// Set at the tick the change was first seen; kept across re-arms.
    failover_start: Option<Instant>,
    candidate_master: Option<String>,
    stable_count: u32,
}

/// Holds the state machine for every monitored group.
///
/// `observe` never performs I/O and is safe to call for disjoint groups
/// concurrently. The scheduler runs one task per group, so ticks for the
/// same group never overlap.
pub struct FailoverDetector {
    states: DashMap<String, GroupState>,
    stable_threshold: u32,
}

impl FailoverDetector {
    pub fn new(stable_threshold: u32) -> Self {
        Self {
            states: DashMap::new(),
            stable_threshold,
        }
    }

    /// Register a group with its initial master address, or `None` when the
    /// registration-time read failed.
    pub fn register(&self, namespace: &str, initial_master: Option<String>) {
        self.states.insert(
            namespace.to_string(),
            GroupState {
                last_master: initial_master,
                ..Default::default()
            },
        );
    }

    /// Feed one tick's observation in; returns the episode duration when a
    /// failover has just been confirmed.
    pub fn observe(&self, namespace: &str, observation: Observation) -> Option<Duration> {
        self.observe_at(namespace, observation, Instant::now())
    }

    /// Same as [`FailoverDetector::observe`], with the tick time supplied by
    /// the caller.
    pub fn observe_at(
        &self,
        namespace: &str,
        observation: Observation,
        now: Instant,
    ) -> Option<Duration> {
        let current = match observation {
            Observation::Master(addr) => addr,
            // A failed query is no signal at all: nothing advances, nothing
            // resets, no transition fires.
            Observation::NoSignal => return None,
        };

        let Some(mut state) = self.states.get_mut(namespace) else {
            log::warn!("observation for unregistered group '{}'", namespace);
            return None;
        };

        if !state.in_failover {
            if state.last_master.is_none() {
                // First successful read for a group whose registration read
                // failed; adopt it without opening an episode.
                state.last_master = Some(current);
            } else if state.last_master.as_deref() != Some(current.as_str()) {
                state.in_failover = true;
                state.failover_start = Some(now);
                state.candidate_master = Some(current.clone());
                state.stable_count = 1;
                // Overwritten already at detection, before the episode is
                // confirmed. A second flip inside the episode is compared
                // against the new candidate, not the pre-failover master.
                state.last_master = Some(current);
            }
            return None;
        }

        if state.candidate_master.as_deref() == Some(current.as_str()) {
            state.stable_count += 1;
        } else {
            // Restart the stabilization count against the new candidate
            // without restarting the episode clock.
            state.candidate_master = Some(current);
            state.stable_count = 1;
        }

        if state.stable_count >= self.stable_threshold {
            let duration = state
                .failover_start
                .take()
                .map(|start| now.duration_since(start));
            state.last_master = state.candidate_master.take();
            state.in_failover = false;
            state.stable_count = 0;
            return duration;
        }

        None
    }

    #[cfg(test)]
    fn snapshot(&self, namespace: &str) -> Option<GroupState> {
        self.states.get(namespace).map(|s| s.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "redis-i1";

    fn master(addr: &str) -> Observation {
        Observation::Master(addr.to_string())
    }

    /// Observation timestamps at a 200ms cadence.
    fn tick(base: Instant, n: u64) -> Instant {
        base + Duration::from_millis(n * 200)
    }

    fn detector_with(initial: &str) -> FailoverDetector {
        let detector = FailoverDetector::new(3);
        detector.register(NS, Some(initial.to_string()));
        detector
    }

    #[test]
    fn test_stable_master_emits_nothing() {
        let detector = detector_with("m1:6379");
        let base = Instant::now();
        for n in 0..10 {
            assert_eq!(detector.observe_at(NS, master("m1:6379"), tick(base, n)), None);
        }
        let state = detector.snapshot(NS).unwrap();
        assert!(!state.in_failover);
        assert_eq!(state.last_master.as_deref(), Some("m1:6379"));
    }

    #[test]
    fn test_debounce_confirms_after_threshold() {
        let detector = detector_with("m1:6379");
        let base = Instant::now();

        // Change detected at tick 0, confirmed on the third agreeing
        // observation at tick 2.
        assert_eq!(detector.observe_at(NS, master("m2:6379"), tick(base, 0)), None);
        assert_eq!(detector.observe_at(NS, master("m2:6379"), tick(base, 1)), None);
        let duration = detector.observe_at(NS, master("m2:6379"), tick(base, 2));
        assert_eq!(duration, Some(Duration::from_millis(400)));

        let state = detector.snapshot(NS).unwrap();
        assert!(!state.in_failover);
        assert_eq!(state.last_master.as_deref(), Some("m2:6379"));
        assert_eq!(state.candidate_master, None);
        assert_eq!(state.stable_count, 0);
    }

    #[test]
    fn test_flapping_never_confirms() {
        let detector = detector_with("m1:6379");
        let base = Instant::now();

        // A different address on every tick never reaches the threshold.
        for n in 0..20 {
            let addr = format!("m{}:6379", n % 2 + 2);
            assert_eq!(
                detector.observe_at(NS, Observation::Master(addr), tick(base, n)),
                None
            );
        }
        assert!(detector.snapshot(NS).unwrap().in_failover);
    }

    #[test]
    fn test_rearm_measures_from_original_start() {
        let detector = detector_with("m1:6379");
        let base = Instant::now();

        // Episode opens on m2 at tick 0, re-arms on m3 at tick 1; the
        // episode clock is not restarted, so the confirmed duration covers
        // the full multi-flip span.
        assert_eq!(detector.observe_at(NS, master("m2:6379"), tick(base, 0)), None);
        assert_eq!(detector.observe_at(NS, master("m3:6379"), tick(base, 1)), None);
        assert_eq!(detector.observe_at(NS, master("m3:6379"), tick(base, 2)), None);
        let duration = detector.observe_at(NS, master("m3:6379"), tick(base, 3));
        assert_eq!(duration, Some(Duration::from_millis(600)));

        let state = detector.snapshot(NS).unwrap();
        assert_eq!(state.last_master.as_deref(), Some("m3:6379"));
    }

    #[test]
    fn test_worked_sequence_m1_m1_m2_m3_m2_m2_m2() {
        // The multi-flip sequence at a 200ms cadence: episode opens on the
        // first m2 (tick 2), re-arms on m3 (tick 3) and again back on m2
        // (tick 4), confirms on the third consecutive m2 (tick 6).
        let detector = detector_with("m1:6379");
        let base = Instant::now();

        let sequence = ["m1", "m1", "m2", "m3", "m2", "m2"];
        for (n, addr) in sequence.iter().enumerate() {
            let obs = master(&format!("{}:6379", addr));
            assert_eq!(detector.observe_at(NS, obs, tick(base, n as u64)), None);
        }
        let duration = detector.observe_at(NS, master("m2:6379"), tick(base, 6));

        // Measured from the first differing observation (tick 2) to the
        // confirming one (tick 6).
        assert_eq!(duration, Some(Duration::from_millis(800)));
        let state = detector.snapshot(NS).unwrap();
        assert!(!state.in_failover);
        assert_eq!(state.last_master.as_deref(), Some("m2:6379"));
    }

    #[test]
    fn test_no_signal_changes_nothing() {
        let detector = detector_with("m1:6379");
        let base = Instant::now();

        // Mid-episode: one failed query between agreeing observations must
        // not advance or reset the count.
        detector.observe_at(NS, master("m2:6379"), tick(base, 0));
        detector.observe_at(NS, master("m2:6379"), tick(base, 1));
        let before = detector.snapshot(NS).unwrap();

        assert_eq!(detector.observe_at(NS, Observation::NoSignal, tick(base, 2)), None);
        let after = detector.snapshot(NS).unwrap();
        assert_eq!(after.stable_count, before.stable_count);
        assert_eq!(after.candidate_master, before.candidate_master);
        assert_eq!(after.last_master, before.last_master);
        assert_eq!(after.in_failover, before.in_failover);

        // Next agreeing observation still confirms, measured to its tick.
        let duration = detector.observe_at(NS, master("m2:6379"), tick(base, 3));
        assert_eq!(duration, Some(Duration::from_millis(600)));
    }

    #[test]
    fn test_unknown_initial_master_is_adopted_silently() {
        let detector = FailoverDetector::new(3);
        detector.register(NS, None);
        let base = Instant::now();

        assert_eq!(detector.observe_at(NS, master("m1:6379"), tick(base, 0)), None);
        let state = detector.snapshot(NS).unwrap();
        assert!(!state.in_failover);
        assert_eq!(state.last_master.as_deref(), Some("m1:6379"));

        // A later change is a real episode.
        assert_eq!(detector.observe_at(NS, master("m2:6379"), tick(base, 1)), None);
        assert!(detector.snapshot(NS).unwrap().in_failover);
    }

    #[test]
    fn test_threshold_one_confirms_on_next_observation() {
        let detector = FailoverDetector::new(1);
        detector.register(NS, Some("m1:6379".to_string()));
        let base = Instant::now();

        // Detection itself never confirms; the next in-episode observation
        // does, whatever it is.
        assert_eq!(detector.observe_at(NS, master("m2:6379"), tick(base, 0)), None);
        let duration = detector.observe_at(NS, master("m2:6379"), tick(base, 1));
        assert_eq!(duration, Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_groups_are_isolated() {
        let detector = FailoverDetector::new(3);
        detector.register("group-a", Some("a1:6379".to_string()));
        detector.register("group-b", Some("b1:6379".to_string()));
        let base = Instant::now();

        // Group A is unreachable for ten ticks while group B runs a full
        // detect-confirm episode.
        for n in 0..10 {
            assert_eq!(
                detector.observe_at("group-a", Observation::NoSignal, tick(base, n)),
                None
            );
        }
        detector.observe_at("group-b", master("b2:6379"), tick(base, 0));
        detector.observe_at("group-b", master("b2:6379"), tick(base, 1));
        let duration = detector.observe_at("group-b", master("b2:6379"), tick(base, 2));
        assert_eq!(duration, Some(Duration::from_millis(400)));

        let a = detector.snapshot("group-a").unwrap();
        assert!(!a.in_failover);
        assert_eq!(a.last_master.as_deref(), Some("a1:6379"));
        assert_eq!(a.stable_count, 0);
    }

    #[test]
    fn test_unregistered_group_is_ignored() {
        let detector = FailoverDetector::new(3);
        assert_eq!(detector.observe(NS, master("m1:6379")), None);
    }
}
