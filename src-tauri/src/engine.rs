//! Smooth Scroll Engine — `spec.md` §4.3.
//!
//! Two independent `AxisRunner`s absorb notches, blend them into in-flight
//! animations via the head/tail pixel-allocation curve, and are driven by
//! one shared tick function (`spec.md` §9: "two axes, shared timer").
//! Injection is performed by the caller-supplied closure so the pure pixel
//! math here stays free of Win32 calls and is directly unit-testable.

use std::time::{Duration, Instant};

use crate::resolver::EffectiveParameters;
use crate::win32::SendHwnd;

/// Fixed tick cadence. Chosen at the midpoint of the spec's 8-16ms range;
/// does not change once the engine starts, per `spec.md` §4.3.
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AbsorbOutcome {
    /// The notch was merged into a new in-flight animation.
    Animated,
    /// `horizontal_smoothness` was off; emit this signed pixel amount now.
    Immediate(i32),
}

fn ease_in_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * t
}

fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

struct ActiveAnimation {
    /// Unsigned pixel budget for this notch (`step_size_px * acceleration`).
    total_px: f64,
    /// Unsigned pixels emitted so far.
    emitted_px: f64,
    /// +1.0 or -1.0.
    direction: f64,
    start: Instant,
    lifetime_ms: f64,
    head_ms: f64,
    tail_ms: f64,
    easing: bool,
}

impl ActiveAnimation {
    /// Fraction (0.0-1.0) of `total_px` owed as of `elapsed_ms` since start.
    /// Head phase rises from 0 to the head/lifetime crossover point; tail
    /// phase rises from the crossover to 1.0. With a cubic ease on each
    /// phase, value and first derivative match exactly at the boundary
    /// (see `DESIGN.md`), satisfying the C1-continuity requirement.
    fn cumulative_fraction(&self, elapsed_ms: f64) -> f64 {
        if elapsed_ms <= 0.0 {
            return 0.0;
        }
        if elapsed_ms >= self.lifetime_ms {
            return 1.0;
        }
        let crossover = if self.lifetime_ms > 0.0 {
            self.head_ms / self.lifetime_ms
        } else {
            1.0
        };
        if elapsed_ms <= self.head_ms {
            let t = if self.head_ms > 0.0 {
                elapsed_ms / self.head_ms
            } else {
                1.0
            };
            let shaped = if self.easing { ease_in_cubic(t) } else { t };
            shaped * crossover
        } else {
            let t = if self.tail_ms > 0.0 {
                (elapsed_ms - self.head_ms) / self.tail_ms
            } else {
                1.0
            };
            let shaped = if self.easing { ease_out_cubic(t) } else { t };
            crossover + shaped * (1.0 - crossover)
        }
    }

    fn remaining(&self) -> f64 {
        self.total_px - self.emitted_px
    }
}

/// Per-axis live state — the concrete `AxisRunnerState` of `spec.md` §3.
pub struct AxisRunner {
    axis: Axis,
    active: Vec<ActiveAnimation>,
    residual_fraction: f64,
    last_notch_time: Option<Instant>,
    current_acceleration: i32,
    target_window: Option<SendHwnd>,
}

impl AxisRunner {
    fn new(axis: Axis) -> Self {
        Self {
            axis,
            active: Vec::new(),
            residual_fraction: 0.0,
            last_notch_time: None,
            current_acceleration: 1,
            target_window: None,
        }
    }

    pub fn current_acceleration(&self) -> i32 {
        self.current_acceleration
    }

    pub fn target_window(&self) -> Option<SendHwnd> {
        self.target_window
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Discard all in-flight animations without emitting their remainder —
    /// the engine-stop cancellation semantics of `spec.md` §5.
    pub fn clear(&mut self) {
        self.active.clear();
        self.residual_fraction = 0.0;
        self.last_notch_time = None;
        self.current_acceleration = 1;
        self.target_window = None;
    }

    /// Absorb one notch. Updates acceleration stacking per `spec.md` §4.3:
    /// Δ ≤ `acceleration_delta_ms` stacks (capped at `acceleration_max`);
    /// otherwise resets to 1. `target_window` is re-derived per notch
    /// (captured at arrival time, never retro-updated mid-flight).
    pub fn absorb_notch(
        &mut self,
        now: Instant,
        raw_direction: i32,
        params: EffectiveParameters,
        target: Option<SendHwnd>,
    ) -> AbsorbOutcome {
        let delta_ms = self
            .last_notch_time
            .map(|last| now.saturating_duration_since(last).as_millis() as i64);
        match delta_ms {
            Some(d) if d <= params.acceleration_delta_ms as i64 => {
                self.current_acceleration =
                    (self.current_acceleration + 1).min(params.acceleration_max.max(1));
            }
            _ => {
                self.current_acceleration = 1;
            }
        }
        self.last_notch_time = Some(now);
        self.target_window = target;

        let mut sign = if raw_direction >= 0 { 1.0 } else { -1.0 };
        if params.reverse_wheel_direction {
            sign = -sign;
        }
        let magnitude = params.step_size_px as f64 * self.current_acceleration as f64;

        if self.axis == Axis::Horizontal && !params.horizontal_smoothness {
            return AbsorbOutcome::Immediate((magnitude * sign).round() as i32);
        }

        let lifetime_ms = params.animation_time_ms.max(1) as f64;
        let r = params.tail_to_head_ratio.max(1) as f64;
        let head_ms = lifetime_ms / (1.0 + r);
        let tail_ms = lifetime_ms * r / (1.0 + r);

        self.active.push(ActiveAnimation {
            total_px: magnitude,
            emitted_px: 0.0,
            direction: sign,
            start: now,
            lifetime_ms,
            head_ms,
            tail_ms,
            easing: params.animation_easing,
        });

        AbsorbOutcome::Animated
    }

    /// Prune, compute, and emit this tick's contribution. `inject` is only
    /// invoked when the integer pixel amount is non-zero; if it returns
    /// `false` (`InjectionFailed`), no state is committed — those pixels
    /// remain owed and fold into next tick's computation.
    pub fn tick<F: FnMut(i32) -> bool>(&mut self, now: Instant, mut inject: F) {
        if self.active.is_empty() && self.residual_fraction.abs() < 1e-9 {
            return;
        }

        let mut owed: Vec<f64> = Vec::with_capacity(self.active.len());
        let mut signed_sum = 0.0f64;
        for anim in &self.active {
            let elapsed_ms = now.saturating_duration_since(anim.start).as_secs_f64() * 1000.0;
            let frac = anim.cumulative_fraction(elapsed_ms);
            let cum_px = frac * anim.total_px;
            let delta = (cum_px - anim.emitted_px).max(0.0);
            owed.push(delta);
            signed_sum += delta * anim.direction;
        }

        let total = signed_sum + self.residual_fraction;
        let integer_part = total.trunc();
        let new_residual = total - integer_part;
        let px = integer_part as i32;

        let committed = if px != 0 { inject(px) } else { true };

        if committed {
            for (anim, delta) in self.active.iter_mut().zip(owed.into_iter()) {
                anim.emitted_px += delta;
            }
            self.residual_fraction = new_residual;
            self.active.retain(|a| a.remaining() > 1e-6);
        }
    }
}

/// Owns both axis runners and the currently-applied parameter tuple.
pub struct Engine {
    vertical: AxisRunner,
    horizontal: AxisRunner,
    current_params: EffectiveParameters,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            vertical: AxisRunner::new(Axis::Vertical),
            horizontal: AxisRunner::new(Axis::Horizontal),
            current_params: EffectiveParameters {
                step_size_px: 12,
                animation_time_ms: 250,
                acceleration_delta_ms: 60,
                acceleration_max: 6,
                tail_to_head_ratio: 2,
                animation_easing: true,
                horizontal_smoothness: true,
                reverse_wheel_direction: false,
            },
        }
    }

    /// Replace the live parameter tuple atomically. In-flight animations
    /// keep their captured parameters — they do not retro-warp mid-flight
    /// (`spec.md` §4.3).
    pub fn apply_settings(&mut self, params: EffectiveParameters) {
        self.current_params = params;
    }

    pub fn current_params(&self) -> EffectiveParameters {
        self.current_params
    }

    pub fn axis_runner(&self, axis: Axis) -> &AxisRunner {
        match axis {
            Axis::Vertical => &self.vertical,
            Axis::Horizontal => &self.horizontal,
        }
    }

    pub fn absorb_notch(
        &mut self,
        axis: Axis,
        now: Instant,
        raw_direction: i32,
        target: Option<SendHwnd>,
    ) -> AbsorbOutcome {
        let params = self.current_params;
        match axis {
            Axis::Vertical => self.vertical.absorb_notch(now, raw_direction, params, target),
            Axis::Horizontal => self.horizontal.absorb_notch(now, raw_direction, params, target),
        }
    }

    pub fn tick<FV: FnMut(i32) -> bool, FH: FnMut(i32) -> bool>(
        &mut self,
        now: Instant,
        inject_vertical: FV,
        inject_horizontal: FH,
    ) {
        self.vertical.tick(now, inject_vertical);
        self.horizontal.tick(now, inject_horizontal);
    }

    /// Stop: discard in-flight animations on both axes without emitting
    /// their remainder (`spec.md` §5 cancellation semantics).
    pub fn stop(&mut self) {
        self.vertical.clear();
        self.horizontal.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_params() -> EffectiveParameters {
        EffectiveParameters {
            step_size_px: 12,
            animation_time_ms: 250,
            acceleration_delta_ms: 60,
            acceleration_max: 6,
            tail_to_head_ratio: 2,
            animation_easing: true,
            horizontal_smoothness: true,
            reverse_wheel_direction: false,
        }
    }

    fn run_until_dry(runner: &mut AxisRunner, start: Instant) -> i32 {
        let mut total_emitted = 0i32;
        let mut now = start;
        for _ in 0..200 {
            now += TICK_INTERVAL;
            runner.tick(now, |px| {
                total_emitted += px;
                true
            });
        }
        total_emitted
    }

    #[test]
    fn single_notch_defaults_sums_to_step_size() {
        let mut runner = AxisRunner::new(Axis::Vertical);
        let t0 = Instant::now();
        let outcome = runner.absorb_notch(t0, 1, default_params(), None);
        assert_eq!(outcome, AbsorbOutcome::Animated);

        let total = run_until_dry(&mut runner, t0);
        assert_eq!(total, 12);
        assert_eq!(runner.active_count(), 0);
    }

    #[test]
    fn acceleration_stack_of_three() {
        let mut runner = AxisRunner::new(Axis::Vertical);
        let t0 = Instant::now();
        runner.absorb_notch(t0, 1, default_params(), None);
        assert_eq!(runner.current_acceleration(), 1);

        let t1 = t0 + Duration::from_millis(30);
        runner.absorb_notch(t1, 1, default_params(), None);
        assert_eq!(runner.current_acceleration(), 2);

        let t2 = t1 + Duration::from_millis(25); // 55ms after t1's predecessor window
        runner.absorb_notch(t2, 1, default_params(), None);
        assert_eq!(runner.current_acceleration(), 3);

        let total = run_until_dry(&mut runner, t2);
        // 1x + 2x + 3x of step_size_px = 6 * 12
        assert_eq!(total, 6 * 12);
    }

    #[test]
    fn acceleration_resets_after_gap_exceeds_threshold() {
        let mut runner = AxisRunner::new(Axis::Vertical);
        let t0 = Instant::now();
        runner.absorb_notch(t0, 1, default_params(), None);
        let t1 = t0 + Duration::from_millis(30);
        runner.absorb_notch(t1, 1, default_params(), None);
        assert_eq!(runner.current_acceleration(), 2);

        let t2 = t1 + Duration::from_millis(61); // > acceleration_delta_ms
        runner.absorb_notch(t2, 1, default_params(), None);
        assert_eq!(runner.current_acceleration(), 1);
    }

    #[test]
    fn negative_notch_emits_negative_total() {
        let mut runner = AxisRunner::new(Axis::Vertical);
        let t0 = Instant::now();
        runner.absorb_notch(t0, -1, default_params(), None);
        let total = run_until_dry(&mut runner, t0);
        assert_eq!(total, -12);
    }

    #[test]
    fn reverse_wheel_direction_flips_sign() {
        let mut runner = AxisRunner::new(Axis::Vertical);
        let mut params = default_params();
        params.reverse_wheel_direction = true;
        let t0 = Instant::now();
        runner.absorb_notch(t0, 1, params, None);
        let total = run_until_dry(&mut runner, t0);
        assert_eq!(total, -12);
    }

    #[test]
    fn horizontal_smoothness_false_emits_immediately() {
        let mut runner = AxisRunner::new(Axis::Horizontal);
        let mut params = default_params();
        params.horizontal_smoothness = false;
        let t0 = Instant::now();
        let outcome = runner.absorb_notch(t0, 1, params, None);
        assert_eq!(outcome, AbsorbOutcome::Immediate(12));
        // No animation created, nothing further emitted from tick().
        assert_eq!(runner.active_count(), 0);
        let mut emitted = 0;
        runner.tick(t0 + TICK_INTERVAL, |px| {
            emitted += px;
            true
        });
        assert_eq!(emitted, 0);
    }

    #[test]
    fn injection_failure_defers_pixels_to_next_tick() {
        let mut runner = AxisRunner::new(Axis::Vertical);
        let t0 = Instant::now();
        runner.absorb_notch(t0, 1, default_params(), None);

        // Let enough time pass that a non-trivial amount is owed, but fail
        // the injection.
        let t1 = t0 + Duration::from_millis(50);
        let mut failed_px = 0;
        runner.tick(t1, |px| {
            failed_px = px;
            false
        });
        assert!(failed_px > 0);
        // Nothing was committed: active animation still owes everything.
        assert_eq!(runner.active_count(), 1);

        // Next tick (with success) must emit at least the deferred amount
        // plus whatever accrued in between.
        let t2 = t1 + TICK_INTERVAL;
        let mut second_px = 0;
        runner.tick(t2, |px| {
            second_px = px;
            true
        });
        assert!(second_px >= failed_px);
    }

    #[test]
    fn profile_switch_mid_flight_does_not_retro_warp() {
        let mut engine = Engine::new();
        let t0 = Instant::now();

        let mut profile_a = default_params();
        profile_a.step_size_px = 8;
        engine.apply_settings(profile_a);
        engine.absorb_notch(Axis::Vertical, t0, 1, None);

        let mut profile_b = default_params();
        profile_b.step_size_px = 16;
        engine.apply_settings(profile_b);
        let t1 = t0 + Duration::from_millis(100);
        engine.absorb_notch(Axis::Vertical, t1, 1, None);

        let mut total = 0;
        let mut now = t1;
        for _ in 0..200 {
            now += TICK_INTERVAL;
            engine.tick(now, |px| { total += px; true }, |_| true);
        }
        // 100ms exceeds the default 60ms acceleration window, so the
        // second notch resets to accel=1 rather than stacking: 8 (first,
        // captured under profile_a) + 16 (second, captured under profile_b).
        assert_eq!(total, 8 + 16);
    }

    #[test]
    fn invariant_sum_of_emitted_plus_residual_equals_budget() {
        let mut runner = AxisRunner::new(Axis::Vertical);
        let t0 = Instant::now();
        runner.absorb_notch(t0, 1, default_params(), None);
        let t1 = t0 + Duration::from_millis(30);
        runner.absorb_notch(t1, 1, default_params(), None);

        let mut total_emitted = 0i64;
        let mut now = t1;
        for _ in 0..50 {
            now += TICK_INTERVAL;
            runner.tick(now, |px| {
                total_emitted += px as i64;
                true
            });
        }
        // First notch accel=1 (8->12*1), second accel=2 (12*2) since 30ms <= 60ms.
        let expected_budget = 12 + 12 * 2;
        assert_eq!(total_emitted, expected_budget);
    }

    #[test]
    fn engine_stop_discards_in_flight_animations() {
        let mut engine = Engine::new();
        let t0 = Instant::now();
        engine.absorb_notch(Axis::Vertical, t0, 1, None);
        assert_eq!(engine.axis_runner(Axis::Vertical).active_count(), 1);
        engine.stop();
        assert_eq!(engine.axis_runner(Axis::Vertical).active_count(), 0);
    }
}
