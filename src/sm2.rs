// SM-2 style review scheduler.
// One fixed grading policy: three grades, ease floored at 1.3, fixed 1/3 day
// opening intervals and geometric growth afterwards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EASE: f64 = 2.5;
pub const MIN_EASE: f64 = 1.3;
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

const FIRST_INTERVAL: u32 = 1;
const SECOND_INTERVAL: u32 = 3;
const LAPSE_INTERVAL: u32 = 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Grade {
    Hard,
    #[default]
    Good,
    Easy,
}

impl Grade {
    /// Reads a grade from its wire label. Absent or unrecognised labels are
    /// treated as `Good` rather than rejected.
    pub fn parse(label: Option<&str>) -> Grade {
        match label {
            Some("hard") => Grade::Hard,
            Some("easy") => Grade::Easy,
            _ => Grade::Good,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::Hard => "hard",
            Grade::Good => "good",
            Grade::Easy => "easy",
        }
    }

    /// Quality score on the 0-5 SM-2 scale.
    pub fn quality(self) -> u8 {
        match self {
            Grade::Hard => 2,
            Grade::Good => 3,
            Grade::Easy => 5,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingState {
    pub ease_factor: f64,
    pub repetitions: u32,
    pub interval_days: u32,
    pub due_at: DateTime<Utc>,
}

impl SchedulingState {
    pub fn new(now: DateTime<Utc>) -> SchedulingState {
        SchedulingState {
            ease_factor: DEFAULT_EASE,
            repetitions: 0,
            interval_days: 0,
            due_at: now,
        }
    }

    pub fn is_lapsed(&self) -> bool {
        self.repetitions == 0
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

fn next_ease(ease: f64, q: u8) -> f64 {
    let miss = f64::from(5 - q);
    f64::max(MIN_EASE, ease + (0.1 - miss * (0.08 + miss * 0.02)))
}

// Round half up, never below one day.
fn grow_interval(previous: u32, ease: f64) -> u32 {
    let raw = (f64::from(previous) * ease).round();
    raw.clamp(1.0, f64::from(MAX_INTERVAL_DAYS)) as u32
}

pub fn review(state: SchedulingState, grade: Grade, now: DateTime<Utc>) -> SchedulingState {
    let q = grade.quality();
    let ease_factor = next_ease(state.ease_factor.max(MIN_EASE), q);

    let (repetitions, interval_days) = if q < 3 {
        (0, LAPSE_INTERVAL)
    } else {
        let repetitions = state.repetitions.saturating_add(1);
        let interval = match repetitions {
            1 => FIRST_INTERVAL,
            2 => SECOND_INTERVAL,
            _ => grow_interval(state.interval_days, ease_factor),
        };
        (repetitions, interval)
    };

    SchedulingState {
        ease_factor,
        repetitions,
        interval_days,
        due_at: now + Duration::days(i64::from(interval_days)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap()
    }

    fn state(ease_factor: f64, repetitions: u32, interval_days: u32) -> SchedulingState {
        SchedulingState {
            ease_factor,
            repetitions,
            interval_days,
            due_at: t0(),
        }
    }

    fn run(grades: &[Grade]) -> Vec<SchedulingState> {
        let mut s = SchedulingState::new(t0());
        let mut out = Vec::new();
        let mut now = t0();
        for &g in grades {
            s = review(s, g, now);
            out.push(s);
            now = s.due_at;
        }
        out
    }

    #[test]
    fn grade_labels() {
        assert_eq!(Grade::parse(Some("hard")), Grade::Hard);
        assert_eq!(Grade::parse(Some("good")), Grade::Good);
        assert_eq!(Grade::parse(Some("easy")), Grade::Easy);
        assert_eq!(Grade::parse(None), Grade::Good);
        assert_eq!(Grade::parse(Some("banana")), Grade::Good);
        assert_eq!(Grade::parse(Some("")), Grade::Good);
        // Matching is exact.
        assert_eq!(Grade::parse(Some("Hard")), Grade::Good);
        assert_eq!(Grade::parse(Some(" easy")), Grade::Good);
        assert_eq!(Grade::default(), Grade::Good);
    }

    #[test]
    fn grade_quality() {
        assert_eq!(Grade::Hard.quality(), 2);
        assert_eq!(Grade::Good.quality(), 3);
        assert_eq!(Grade::Easy.quality(), 5);
        for g in [Grade::Hard, Grade::Good, Grade::Easy] {
            assert_eq!(Grade::parse(Some(g.as_str())), g);
        }
    }

    #[test]
    fn new_state_defaults() {
        let s = SchedulingState::new(t0());
        assert_eq!(s.ease_factor, 2.5);
        assert_eq!(s.repetitions, 0);
        assert_eq!(s.interval_days, 0);
        assert_eq!(s.due_at, t0());
        assert!(s.is_lapsed());
        assert!(s.is_due(t0()));
    }

    #[test]
    fn ease_deltas() {
        assert!((next_ease(2.5, 5) - 2.6).abs() < 1e-9);
        assert!((next_ease(2.5, 3) - 2.36).abs() < 1e-9);
        assert!((next_ease(2.5, 2) - 2.18).abs() < 1e-9);
    }

    #[test]
    fn ease_monotonic_in_quality() {
        for ease in [1.3, 1.7, 2.5, 3.1] {
            let hard = next_ease(ease, 2);
            let good = next_ease(ease, 3);
            let easy = next_ease(ease, 5);
            assert!(hard <= good);
            assert!(good < easy);
        }
    }

    #[test]
    fn ease_floor_holds() {
        let s = review(state(1.3, 4, 20), Grade::Hard, t0());
        assert_eq!(s.ease_factor, MIN_EASE);
        let s = review(state(1.3, 4, 20), Grade::Good, t0());
        assert_eq!(s.ease_factor, MIN_EASE);
    }

    #[test]
    fn ease_floor_over_sequences() {
        let patterns: [&[Grade]; 4] = [
            &[Grade::Hard; 20],
            &[Grade::Good; 20],
            &[Grade::Hard, Grade::Good, Grade::Easy, Grade::Hard, Grade::Good],
            &[Grade::Easy, Grade::Easy, Grade::Hard, Grade::Hard, Grade::Hard],
        ];
        for p in patterns {
            for s in run(p) {
                assert!(s.ease_factor >= MIN_EASE);
            }
        }
    }

    #[test]
    fn below_floor_input_is_lifted() {
        let s = review(state(0.9, 3, 10), Grade::Easy, t0());
        assert!((s.ease_factor - 1.4).abs() < 1e-9);
    }

    #[test]
    fn lapse_resets() {
        for prior in [state(2.5, 0, 0), state(2.1, 7, 120), state(1.3, 1, 1)] {
            let s = review(prior, Grade::Hard, t0());
            assert_eq!(s.repetitions, 0);
            assert_eq!(s.interval_days, 1);
            assert!(s.is_lapsed());
        }
    }

    #[test]
    fn first_success_interval() {
        let s = review(SchedulingState::new(t0()), Grade::Good, t0());
        assert_eq!(s.repetitions, 1);
        assert_eq!(s.interval_days, 1);
        let s = review(SchedulingState::new(t0()), Grade::Easy, t0());
        assert_eq!(s.interval_days, 1);
    }

    #[test]
    fn second_success_interval() {
        let states = run(&[Grade::Good, Grade::Good]);
        assert_eq!(states[1].repetitions, 2);
        assert_eq!(states[1].interval_days, 3);
    }

    #[test]
    fn third_success_example() {
        let s = review(state(2.5, 2, 3), Grade::Good, t0());
        assert!((s.ease_factor - 2.36).abs() < 1e-9);
        assert_eq!(s.repetitions, 3);
        // round(3 * 2.36) = round(7.08)
        assert_eq!(s.interval_days, 7);
        assert_eq!(s.due_at, t0() + Duration::days(7));
    }

    #[test]
    fn geometric_growth() {
        let states = run(&[Grade::Easy; 8]);
        for w in states.windows(2).skip(1) {
            let (prev, next) = (w[0], w[1]);
            let expected = (f64::from(prev.interval_days) * next.ease_factor).round() as u32;
            assert_eq!(next.interval_days, expected.max(1));
            assert!(next.interval_days >= prev.interval_days);
        }
    }

    #[test]
    fn growth_non_decreasing_at_floor() {
        let mut s = state(1.3, 2, 3);
        for _ in 0..10 {
            let next = review(s, Grade::Good, t0());
            assert!(next.interval_days >= s.interval_days);
            s = next;
        }
    }

    #[test]
    fn relearning_after_lapse() {
        let states = run(&[Grade::Good, Grade::Good, Grade::Good, Grade::Hard, Grade::Good, Grade::Good]);
        assert_eq!(states[3].interval_days, 1);
        assert_eq!(states[4].interval_days, 1);
        assert_eq!(states[5].interval_days, 3);
    }

    #[test]
    fn rounding_is_half_up() {
        // 3 * 1.5 = 4.5 exactly; banker's rounding or truncation would give 4.
        assert_eq!(grow_interval(3, 1.5), 5);
        assert_eq!(grow_interval(5, 1.5), 8);
        assert_eq!(grow_interval(1, 1.3), 1);
        assert_eq!(grow_interval(0, 2.5), 1);
    }

    #[test]
    fn interval_is_capped() {
        let s = review(state(3.0, 40, MAX_INTERVAL_DAYS), Grade::Easy, t0());
        assert_eq!(s.interval_days, MAX_INTERVAL_DAYS);
        assert_eq!(
            s.due_at,
            t0() + Duration::days(i64::from(MAX_INTERVAL_DAYS))
        );
    }

    #[test]
    fn repetitions_saturate() {
        let s = review(state(2.5, u32::MAX, 10), Grade::Good, t0());
        assert_eq!(s.repetitions, u32::MAX);
    }

    #[test]
    fn due_date_consistency() {
        let now = t0() + Duration::hours(5) + Duration::minutes(17);
        for prior in [state(2.5, 0, 0), state(2.5, 1, 1), state(2.2, 5, 40)] {
            for g in [Grade::Hard, Grade::Good, Grade::Easy] {
                let s = review(prior, g, now);
                assert_eq!(s.due_at, now + Duration::days(i64::from(s.interval_days)));
            }
        }
    }

    #[test]
    fn unknown_grade_matches_good() {
        let prior = state(2.2, 4, 12);
        let a = review(prior, Grade::parse(Some("banana")), t0());
        let b = review(prior, Grade::parse(Some("good")), t0());
        assert_eq!(a, b);
        let c = review(prior, Grade::parse(None), t0());
        assert_eq!(a, c);
    }

    #[test]
    fn deterministic() {
        let prior = state(2.37, 6, 33);
        for g in [Grade::Hard, Grade::Good, Grade::Easy] {
            let a = review(prior, g, t0());
            let b = review(prior, g, t0());
            assert_eq!(a.ease_factor.to_bits(), b.ease_factor.to_bits());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn input_is_not_mutated() {
        let prior = state(2.5, 2, 3);
        let _ = review(prior, Grade::Hard, t0());
        assert_eq!(prior, state(2.5, 2, 3));
    }
}
