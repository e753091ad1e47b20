/// Single-shot silence countdown measured on the sample clock.
///
/// The countdown only moves when audio is consumed, so a stalled capture device can never
/// fire it, and dropping or resetting the owning segmenter cancels it with no leftover task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SilenceTimer {
    remaining: Option<usize>,
}

impl SilenceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or rearm) the timer to fire after `samples` of silence.
    pub fn arm(&mut self, samples: usize) {
        self.remaining = Some(samples);
    }

    pub fn cancel(&mut self) {
        self.remaining = None;
    }

    pub fn is_armed(&self) -> bool {
        self.remaining.is_some()
    }

    /// Count `samples` of silence. Returns `true` exactly once, when the timer fires.
    pub fn advance(&mut self, samples: usize) -> bool {
        let Some(remaining) = self.remaining else {
            return false;
        };

        let left = remaining.saturating_sub(samples);
        if left == 0 {
            self.remaining = None;
            return true;
        }

        self.remaining = Some(left);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_enough_silence() {
        let mut timer = SilenceTimer::new();
        timer.arm(1_000);

        assert!(!timer.advance(400));
        assert!(!timer.advance(400));
        assert!(timer.advance(400));
        assert!(!timer.is_armed());
        assert!(!timer.advance(400));
    }

    #[test]
    fn rearm_restarts_the_countdown() {
        let mut timer = SilenceTimer::new();
        timer.arm(640);
        assert!(!timer.advance(320));

        timer.arm(640);
        assert!(!timer.advance(320));
        assert!(timer.advance(320));
    }

    #[test]
    fn canceled_timer_never_fires() {
        let mut timer = SilenceTimer::new();
        timer.arm(10);
        timer.cancel();
        assert!(!timer.advance(100));
    }
}
