//! Frame-driven timing primitives. Nothing here owns a thread or a timer:
//! callers pass `now` on every animation frame and ask what is due.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Curve {
    Linear,
    Smoothstep,
    #[default]
    EaseInOut,
    EaseOutCubic,
}

impl Curve {
    pub fn sample(self, t: f32) -> f32 {
        let clamped = t.clamp(0.0, 1.0);
        match self {
            Curve::Linear => clamped,
            Curve::Smoothstep => clamped * clamped * (3.0 - 2.0 * clamped),
            Curve::EaseInOut => {
                if clamped < 0.5 {
                    2.0 * clamped * clamped
                } else {
                    -1.0 + (4.0 - 2.0 * clamped) * clamped
                }
            }
            Curve::EaseOutCubic => 1.0 - (1.0 - clamped).powi(3),
        }
    }
}

/// Eased progress from 0 to 1 over a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct FadeEnvelope {
    start: Instant,
    duration: Duration,
    curve: Curve,
}

impl FadeEnvelope {
    /// Returns `None` for a zero duration; callers treat that as "already done".
    pub fn new(duration: Duration, curve: Curve, now: Instant) -> Option<Self> {
        if duration <= Duration::ZERO {
            None
        } else {
            Some(Self {
                start: now,
                duration,
                curve,
            })
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Eased value and whether the envelope has run to completion.
    pub fn sample(&self, now: Instant) -> (f32, bool) {
        let elapsed = now.saturating_duration_since(self.start);
        let progress = elapsed.as_secs_f32() / self.duration.as_secs_f32().max(f32::EPSILON);
        let finished = progress >= 1.0;
        let value = if finished {
            1.0
        } else {
            self.curve.sample(progress)
        };
        (value, finished)
    }
}

/// Fires once, `delay` after the most recent trigger.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// True exactly once per burst of triggers, when the delay has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Tracks a polled value and reports whether it changed recently.
///
/// Used for scroll detection: the position is sampled every frame and the
/// page counts as scrolling until it has been still for the whole window.
#[derive(Debug, Clone)]
pub struct SettleWindow {
    window: Duration,
    last_value: Option<(f32, f32)>,
    last_change: Option<Instant>,
}

impl SettleWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_value: None,
            last_change: None,
        }
    }

    /// Records a sample; returns true when it differs from the previous one.
    pub fn observe(&mut self, value: (f32, f32), now: Instant) -> bool {
        let changed = self.last_value.is_some_and(|last| last != value);
        if changed {
            self.last_change = Some(now);
        }
        self.last_value = Some(value);
        changed
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.last_change
            .is_some_and(|changed| now.saturating_duration_since(changed) < self.window)
    }
}

/// A one-shot deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    deadline: Instant,
}

impl Timeout {
    pub fn after(now: Instant, delay: Duration) -> Self {
        Self {
            deadline: now + delay,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    pub index: u64,
    /// Seconds since the clock started.
    pub time: f32,
    pub delta: Duration,
}

/// Counts animation frames and measures wall-clock time between them.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last: Option<Instant>,
    index: u64,
}

impl FrameClock {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            last: None,
            index: 0,
        }
    }

    pub fn tick(&mut self, now: Instant) -> FrameTick {
        let delta = self
            .last
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.last = Some(now);
        let tick = FrameTick {
            index: self.index,
            time: now.saturating_duration_since(self.start).as_secs_f32(),
            delta,
        };
        self.index += 1;
        tick
    }

    pub fn frames(&self) -> u64 {
        self.index
    }

    /// The `now` of the most recent tick.
    pub fn last(&self) -> Option<Instant> {
        self.last
    }
}
