//! Sample-accurate parameter automation.
//!
//! A [`Param`] holds an intrinsic value plus a time-ordered queue of scheduled
//! events, evaluated once per sample against the graph clock:
//! - `SetValue`   : jump to a value at a time
//! - `LinearRamp` : interpolate from the previous event's (time, value) to the
//!                  ramp's value, reaching it exactly at the ramp's time
//! - `SetTarget`  : exponential approach towards a target with time constant
//!                  `tau`, starting at a time and lasting until the next event
//!
//! Times are seconds on the graph clock (`f64`, so hours of playback keep
//! sub-sample precision). Values are `f32`.

use std::collections::VecDeque;

use ambiance_core::dsp::one_pole_coeff_ms;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Event {
    SetValue { time: f64, value: f32 },
    LinearRamp { time: f64, value: f32 },
    SetTarget { time: f64, target: f32, tau: f64 },
}

impl Event {
    #[inline]
    fn time(&self) -> f64 {
        match *self {
            Event::SetValue { time, .. } | Event::LinearRamp { time, .. } | Event::SetTarget { time, .. } => time,
        }
    }
}

/// Automatable scalar parameter.
#[derive(Clone, Debug)]
pub struct Param {
    value: f32,
    // (time, value) where the last completed event left the parameter
    anchor: (f64, f32),
    events: VecDeque<Event>,
    // cached set-target coefficient: (tau seconds, sample rate, a)
    coeff: (f64, f32, f32),
}

impl Param {
    pub fn new(value: f32) -> Self {
        Self { value, anchor: (0.0, value), events: VecDeque::new(), coeff: (0.0, 0.0, 0.0) }
    }

    /// Current value (as of the last processed sample).
    #[inline] pub fn value(&self) -> f32 { self.value }

    /// True while any event is still pending.
    #[cfg(test)]
    #[inline] pub fn is_automating(&self) -> bool { !self.events.is_empty() }

    /// Set the value immediately, dropping any pending automation.
    pub fn set_value(&mut self, value: f32) {
        self.events.clear();
        self.value = value;
        self.anchor.1 = value;
    }

    fn insert(&mut self, ev: Event) {
        // after any event with the same time, so insertion order breaks ties
        let at = self.events.iter().position(|e| e.time() > ev.time()).unwrap_or(self.events.len());
        self.events.insert(at, ev);
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event::SetValue { time, value });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event::LinearRamp { time, value });
    }

    /// Exponential approach to `target` starting at `time`; after `tau` seconds
    /// about 63% of the distance is covered. `tau <= 0` jumps to the target.
    pub fn set_target_at_time(&mut self, target: f32, time: f64, tau: f64) {
        if tau <= 0.0 {
            self.insert(Event::SetValue { time, value: target });
        } else {
            self.insert(Event::SetTarget { time, target, tau });
        }
    }

    /// Drop every event scheduled at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Drop every event at or after `time` and hold the parameter at the value
    /// it has at `time`. `time` is expected to be the current graph time.
    pub fn cancel_and_hold(&mut self, time: f64) {
        let held = self.value_at(time);
        self.events.retain(|e| e.time() < time);
        self.insert(Event::SetValue { time, value: held });
    }

    /// Value at `time`, resolving an in-flight ramp at the head of the queue.
    fn value_at(&self, time: f64) -> f32 {
        match self.events.front() {
            Some(&Event::LinearRamp { time: end, value }) => ramp(self.anchor, end, value, time),
            _ => self.value,
        }
    }

    #[inline]
    fn target_coeff(&mut self, tau: f64, sr: f32) -> f32 {
        if self.coeff.0 != tau || self.coeff.1 != sr {
            self.coeff = (tau, sr, one_pole_coeff_ms((tau * 1000.0) as f32, sr));
        }
        self.coeff.2
    }

    /// Evaluate the parameter for the sample at time `t` and return its value.
    pub fn process(&mut self, t: f64, sr: f32) -> f32 {
        while let Some(&ev) = self.events.front() {
            match ev {
                Event::SetValue { time, value } => {
                    if time > t { break; }
                    self.value = value;
                    self.anchor = (time, value);
                    self.events.pop_front();
                }
                Event::LinearRamp { time, value } => {
                    if time <= t {
                        self.value = value;
                        self.anchor = (time, value);
                        self.events.pop_front();
                    } else {
                        self.value = ramp(self.anchor, time, value, t);
                        break;
                    }
                }
                Event::SetTarget { time, target, tau } => {
                    if time > t { break; }
                    let superseded = match self.events.get(1) {
                        Some(Event::LinearRamp { .. }) => true,
                        Some(next) => next.time() <= t,
                        None => false,
                    };
                    if superseded {
                        self.anchor = (t, self.value);
                        self.events.pop_front();
                        continue;
                    }
                    let a = self.target_coeff(tau, sr);
                    self.value = target + (self.value - target) * a;
                    self.anchor = (t, self.value);
                    break;
                }
            }
        }
        self.value
    }
}

#[inline]
fn ramp((t0, v0): (f64, f32), t1: f64, v1: f32, t: f64) -> f32 {
    if t1 <= t0 || t >= t1 {
        return v1;
    }
    if t <= t0 {
        return v0;
    }
    let k = ((t - t0) / (t1 - t0)) as f32;
    v0 + (v1 - v0) * k
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SR: f32 = 1000.0;

    /// Run `p` from sample `from` up to (excluding) sample `to`; returns the last value.
    fn run(p: &mut Param, from: u64, to: u64) -> f32 {
        let mut v = p.value();
        for n in from..to {
            v = p.process(n as f64 / f64::from(SR), SR);
        }
        v
    }

    #[test]
    fn holds_intrinsic_value_without_events() {
        let mut p = Param::new(0.25);
        assert_eq!(run(&mut p, 0, 100), 0.25);
        assert!(!p.is_automating());
    }

    #[test]
    fn set_value_at_time_waits_for_its_time() {
        let mut p = Param::new(0.0);
        p.set_value_at_time(1.0, 0.5);
        assert_eq!(run(&mut p, 0, 500), 0.0);
        assert_eq!(run(&mut p, 500, 501), 1.0);
    }

    #[test]
    fn linear_ramp_interpolates_from_previous_event() {
        let mut p = Param::new(0.0);
        p.set_value_at_time(0.0, 1.0);
        p.linear_ramp_to_value_at_time(1.0, 3.0);
        run(&mut p, 0, 2001);
        assert_abs_diff_eq!(p.value(), 0.5, epsilon = 1e-3);
        run(&mut p, 2001, 3500);
        assert_eq!(p.value(), 1.0);
        assert!(!p.is_automating());
    }

    #[test]
    fn set_target_covers_63_percent_after_tau() {
        let mut p = Param::new(0.0);
        p.set_target_at_time(1.0, 0.0, 0.1);
        run(&mut p, 0, 100);
        assert_abs_diff_eq!(p.value(), 1.0 - (-1.0_f32).exp(), epsilon = 0.01);
        run(&mut p, 100, 2000);
        assert_abs_diff_eq!(p.value(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn set_target_runs_until_next_event() {
        let mut p = Param::new(0.0);
        p.set_target_at_time(1.0, 0.0, 0.05);
        p.set_value_at_time(0.2, 0.5);
        run(&mut p, 0, 499);
        assert!(p.value() > 0.9);
        run(&mut p, 499, 600);
        assert_eq!(p.value(), 0.2);
    }

    #[test]
    fn cancel_and_hold_freezes_mid_ramp() {
        let mut p = Param::new(0.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 2.0);
        run(&mut p, 0, 1001);
        let now = 1.0;
        p.cancel_and_hold(now);
        run(&mut p, 1001, 3000);
        assert_abs_diff_eq!(p.value(), 0.5, epsilon = 1e-3);
    }

    #[test]
    fn cancel_and_hold_then_ramp_starts_from_held_value() {
        let mut p = Param::new(0.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 2.0);
        run(&mut p, 0, 1000);
        let now = 1.0;
        p.cancel_and_hold(now);
        p.linear_ramp_to_value_at_time(0.0, now + 1.0);
        run(&mut p, 1000, 1501);
        assert_abs_diff_eq!(p.value(), 0.25, epsilon = 1e-2);
        run(&mut p, 1501, 2100);
        assert_eq!(p.value(), 0.0);
    }

    #[test]
    fn cancel_scheduled_values_drops_future_events() {
        let mut p = Param::new(0.3);
        p.set_value_at_time(0.9, 1.0);
        p.set_value_at_time(0.1, 2.0);
        p.cancel_scheduled_values(1.5);
        run(&mut p, 0, 3000);
        assert_eq!(p.value(), 0.9);
    }

    #[test]
    fn equal_times_apply_in_insertion_order() {
        let mut p = Param::new(0.0);
        p.set_value_at_time(0.4, 0.1);
        p.set_value_at_time(0.7, 0.1);
        run(&mut p, 0, 200);
        assert_eq!(p.value(), 0.7);
    }
}
