//! Lens entrance: `Hidden -> Revealing -> Revealed`, with one page-wide fade
//! shared by every lens that is revealing at the same time.

use std::time::{Duration, Instant};

use scheduler::{Curve, FadeEnvelope};

use crate::types::RevealMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealState {
    Hidden,
    Revealing,
    Revealed,
}

/// Inputs to [`RevealMachine::advance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RevealStep {
    TextureReady,
    Progress(f32),
    Complete,
}

/// Emitted exactly once, on entering `Revealed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Revealed;

#[derive(Debug, Clone)]
pub(crate) struct RevealMachine {
    mode: RevealMode,
    state: RevealState,
    progress: f32,
}

impl RevealMachine {
    pub fn new(mode: RevealMode) -> Self {
        Self {
            mode,
            state: RevealState::Hidden,
            progress: 0.0,
        }
    }

    pub fn state(&self) -> RevealState {
        self.state
    }

    pub fn mode(&self) -> RevealMode {
        self.mode
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// The only transition function. Progress never decreases and a
    /// revealed lens ignores every further step.
    pub fn advance(&mut self, step: RevealStep) -> Option<Revealed> {
        match (self.state, step) {
            (RevealState::Hidden, RevealStep::TextureReady) => match self.mode {
                RevealMode::Instant => self.finish(),
                RevealMode::Fade => {
                    self.state = RevealState::Revealing;
                    self.progress = 0.0;
                    None
                }
            },
            (RevealState::Revealing, RevealStep::Progress(value)) => {
                self.progress = self.progress.max(value.clamp(0.0, 1.0));
                None
            }
            (RevealState::Revealing, RevealStep::Complete) => self.finish(),
            _ => None,
        }
    }

    fn finish(&mut self) -> Option<Revealed> {
        self.state = RevealState::Revealed;
        self.progress = 1.0;
        Some(Revealed)
    }
}

/// The page-wide fade. Lenses that start revealing while it runs join it
/// at its current value.
#[derive(Debug, Clone)]
pub(crate) struct SharedFade {
    duration: Duration,
    curve: Curve,
    envelope: Option<FadeEnvelope>,
}

/// One sample of the shared fade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum FadeSample {
    Idle,
    Running(f32),
    Finished,
}

impl SharedFade {
    pub fn new(duration: Duration, curve: Curve) -> Self {
        Self {
            duration,
            curve,
            envelope: None,
        }
    }

    /// Starts the fade unless one is already running. Returns false when
    /// the duration is zero and lenses should complete immediately.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.envelope.is_some() {
            return true;
        }
        self.envelope = FadeEnvelope::new(self.duration, self.curve, now);
        if self.envelope.is_some() {
            tracing::debug!(duration_ms = self.duration.as_millis() as u64, "reveal fade started");
        }
        self.envelope.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.envelope.is_some()
    }

    pub fn sample(&mut self, now: Instant) -> FadeSample {
        let Some(envelope) = self.envelope else {
            return FadeSample::Idle;
        };
        let (value, finished) = envelope.sample(now);
        if finished {
            self.envelope = None;
            FadeSample::Finished
        } else {
            FadeSample::Running(value)
        }
    }
}
