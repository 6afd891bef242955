//! Timeline control over one mounted animation.
//!
//! The controller owns the pristine markup snapshot plus a Playing/Paused
//! state machine and a display-only elapsed clock. Seeking is destructive by
//! design: the subtree is reloaded from the snapshot (undoing earlier delay
//! offsets) and every animated element is fast-forwarded with a negative
//! delay. The elapsed clock ticks on a fixed cadence and may drift from the
//! rendered position; it only feeds the counter and progress bar.

use std::time::Duration;

use crate::surface::{AnimationSurface, PlayState};

/// Cadence of the display clock.
pub const TICK: Duration = Duration::from_millis(100);

/// Nominal loop length used for progress display until the user adjusts it.
/// The markup itself carries no authoritative duration.
pub const DEFAULT_CYCLE_SECONDS: f64 = 10.0;

#[derive(Debug)]
pub struct PlaybackController<S: AnimationSurface> {
    surface: S,
    source: String,
    state: PlayState,
    elapsed: f64,
    cycle_seconds: f64,
}

impl<S: AnimationSurface> PlaybackController<S> {
    /// A controller with nothing mounted; every operation is a no-op until
    /// [`load`](Self::load) succeeds.
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            source: String::new(),
            state: PlayState::Paused,
            elapsed: 0.0,
            cycle_seconds: DEFAULT_CYCLE_SECONDS,
        }
    }

    /// Mount an animation. Playback starts immediately.
    pub fn load(&mut self, svg_content: &str) -> crate::error::SvgmotionResult<()> {
        self.surface.replace_markup(svg_content)?;
        self.source = svg_content.to_string();
        self.state = PlayState::Running;
        self.elapsed = 0.0;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        !self.source.is_empty() && self.surface.is_loaded()
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Running
    }

    pub fn play_state(&self) -> PlayState {
        self.state
    }

    /// Seconds accumulated by the display clock.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn cycle_seconds(&self) -> f64 {
        self.cycle_seconds
    }

    /// Adjust the nominal loop length. Affects progress display scaling
    /// only, never playback.
    pub fn set_cycle_seconds(&mut self, seconds: f64) {
        if seconds > 0.0 {
            self.cycle_seconds = seconds;
        }
    }

    /// Position within the current display cycle.
    pub fn position(&self) -> f64 {
        self.elapsed % self.cycle_seconds
    }

    /// Flip Playing/Paused and mirror the state onto the rendered subtree.
    /// Leaves the elapsed clock untouched.
    pub fn toggle_play_pause(&mut self) {
        if !self.is_ready() {
            return;
        }
        self.state = self.state.toggled();
        self.surface.set_play_state(self.state);
    }

    /// Advance the display clock by one cadence step.
    pub fn tick(&mut self) {
        if self.is_ready() && self.is_playing() {
            self.elapsed += TICK.as_secs_f64();
        }
    }

    /// Jump to `target_seconds`: reload the pristine markup, fast-forward
    /// into the timeline, and reapply the current play-state.
    pub fn seek(&mut self, target_seconds: f64) {
        if !self.is_ready() {
            return;
        }
        let target = target_seconds.max(0.0);
        if self.surface.replace_markup(&self.source).is_err() {
            // The snapshot parsed when it was loaded; nothing sane to do if
            // it stopped parsing.
            return;
        }
        self.surface.fast_forward(target);
        self.surface.set_play_state(self.state);
        self.elapsed = target;
    }

    /// Back to frame zero, playing.
    pub fn reset(&mut self) {
        if !self.is_ready() {
            return;
        }
        self.state = PlayState::Running;
        self.seek(0.0);
    }

    /// Current markup of the rendered subtree.
    pub fn markup(&self) -> Option<String> {
        self.surface.markup()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Drive the display clock on the tick cadence for roughly `wall` time.
    /// Dropping the returned future stops the clock; there is no other
    /// teardown.
    pub async fn run_for(&mut self, wall: Duration) {
        let start = tokio::time::Instant::now();
        let mut interval = tokio::time::interval_at(start + TICK, TICK);
        loop {
            interval.tick().await;
            if start.elapsed() > wall {
                break;
            }
            self.tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::DomSurface;

    const MARKUP: &str = r#"<svg viewBox="0 0 800 600"><style>.orbit { animation: orbit 6s linear infinite; }</style><circle class="orbit" r="9"/></svg>"#;

    fn loaded() -> PlaybackController<DomSurface> {
        let mut controller = PlaybackController::new(DomSurface::new());
        controller.load(MARKUP).unwrap();
        controller
    }

    #[test]
    fn load_starts_playing_from_zero() {
        let controller = loaded();
        assert!(controller.is_playing());
        assert_eq!(controller.elapsed(), 0.0);
    }

    #[test]
    fn toggle_twice_is_a_no_op() {
        let mut controller = loaded();
        let elapsed = controller.elapsed();
        controller.toggle_play_pause();
        assert!(!controller.is_playing());
        controller.toggle_play_pause();
        assert!(controller.is_playing());
        assert_eq!(controller.elapsed(), elapsed);
    }

    #[test]
    fn clock_only_advances_while_playing() {
        let mut controller = loaded();
        controller.tick();
        controller.tick();
        assert!((controller.elapsed() - 0.2).abs() < 1e-9);

        controller.toggle_play_pause();
        controller.tick();
        assert!((controller.elapsed() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn seek_rewrites_delays_and_clock() {
        let mut controller = loaded();
        controller.seek(2.5);
        assert_eq!(controller.elapsed(), 2.5);
        assert_eq!(controller.surface().animated_delays(), vec![-2.5]);

        // seeking again starts from the pristine snapshot, not the offset one
        controller.seek(1.0);
        assert_eq!(controller.surface().animated_delays(), vec![-1.0]);
    }

    #[test]
    fn seek_preserves_paused_state() {
        let mut controller = loaded();
        controller.toggle_play_pause();
        controller.seek(3.0);
        assert!(!controller.is_playing());
        assert!(
            controller
                .markup()
                .unwrap()
                .contains("animation-play-state: paused")
        );
    }

    #[test]
    fn reset_matches_seek_zero_plus_playing() {
        for pause_first in [false, true] {
            let mut controller = loaded();
            controller.seek(4.2);
            if pause_first {
                controller.toggle_play_pause();
            }
            controller.reset();
            assert!(controller.is_playing());
            assert_eq!(controller.elapsed(), 0.0);
            assert_eq!(controller.surface().animated_delays(), vec![-0.0]);
        }
    }

    #[test]
    fn position_wraps_at_cycle_length() {
        let mut controller = loaded();
        controller.set_cycle_seconds(4.0);
        controller.seek(9.5);
        assert!((controller.position() - 1.5).abs() < 1e-9);

        controller.set_cycle_seconds(0.0); // rejected
        assert_eq!(controller.cycle_seconds(), 4.0);
    }

    #[test]
    fn unmounted_controller_ignores_commands() {
        let mut controller = PlaybackController::new(DomSurface::new());
        controller.toggle_play_pause();
        controller.seek(2.0);
        controller.reset();
        controller.tick();
        assert!(!controller.is_playing());
        assert_eq!(controller.elapsed(), 0.0);
        assert!(controller.markup().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn run_for_ticks_on_cadence() {
        let mut controller = loaded();
        controller.run_for(Duration::from_millis(450)).await;
        // four full cadence steps fit in 450ms
        assert!((controller.elapsed() - 0.4).abs() < 1e-9);
    }
}
