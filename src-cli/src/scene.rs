//! Synthetic render loop used by `steadyrec record`.
//!
//! Draws a moving bar over a shifting gradient into a [`SoftwareSurface`]
//! and paces itself with deliberately irregular frame intervals, the way a
//! real renderer under load would.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use steadyrec::SoftwareSurface;

/// Relative spread of the frame interval around the nominal rate.
const JITTER: f64 = 0.3;

/// Chance that a frame takes twice as long as usual.
const HITCH_PROBABILITY: f64 = 0.05;

/// Seconds for the bar to cross the surface.
const SWEEP_PERIOD: f64 = 2.0;

pub struct Scene {
    width: u32,
    height: u32,
    base_interval: f64,
    rng: StdRng,
}

impl Scene {
    pub fn new(width: u32, height: u32, nominal_fps: f64, seed: u64) -> Self {
        Self {
            width,
            height,
            base_interval: 1.0 / nominal_fps,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw the frame for render time `t` seconds.
    pub fn render(&self, surface: &mut SoftwareSurface, t: f64) {
        let phase = (t / SWEEP_PERIOD).fract();
        let bar_x = (phase * self.width as f64) as u32;
        let bar_half = (self.width / 32).max(1);
        let red = ((t * 64.0) as u64 % 256) as u8;

        for y in 0..self.height {
            let green = (y as u64 * 255 / self.height.max(1) as u64) as u8;
            let row = surface.row_mut(y);
            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let x = x as u32;
                if x.abs_diff(bar_x) < bar_half {
                    pixel.copy_from_slice(&[255, 255, 255, 255]);
                } else {
                    let blue = (x as u64 * 255 / self.width.max(1) as u64) as u8;
                    pixel.copy_from_slice(&[blue, green, red, 255]);
                }
            }
        }
    }

    /// Time until the next frame: the nominal interval with random jitter
    /// and an occasional hitch.
    pub fn next_interval(&mut self) -> Duration {
        let mut interval = self.base_interval * self.rng.gen_range(1.0 - JITTER..=1.0 + JITTER);
        if self.rng.gen_bool(HITCH_PROBABILITY) {
            interval *= 2.0;
        }
        Duration::from_secs_f64(interval)
    }
}

/// Source of render time for the loop.
pub enum RenderClock {
    /// Wall clock; advancing sleeps.
    Realtime { start: Instant },
    /// Simulated clock; advancing returns immediately.
    Simulated { now: Duration },
}

impl RenderClock {
    pub fn realtime() -> Self {
        RenderClock::Realtime {
            start: Instant::now(),
        }
    }

    pub fn simulated() -> Self {
        RenderClock::Simulated { now: Duration::ZERO }
    }

    pub fn now(&self) -> Duration {
        match self {
            RenderClock::Realtime { start } => start.elapsed(),
            RenderClock::Simulated { now } => *now,
        }
    }

    /// Wait out one frame interval, measured from `frame_start`.
    pub fn advance(&mut self, frame_start: Duration, interval: Duration) {
        match self {
            RenderClock::Realtime { start } => {
                let deadline = frame_start + interval;
                let elapsed = start.elapsed();
                if deadline > elapsed {
                    std::thread::sleep(deadline - elapsed);
                }
            }
            RenderClock::Simulated { now } => *now = frame_start + interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals_stay_in_range() {
        let mut scene = Scene::new(8, 8, 25.0, 7);
        let base = 1.0 / 25.0;
        for _ in 0..500 {
            let interval = scene.next_interval().as_secs_f64();
            assert!(interval >= base * (1.0 - JITTER) - 1e-9);
            assert!(interval <= base * (1.0 + JITTER) * 2.0 + 1e-9);
        }
    }

    #[test]
    fn test_same_seed_same_timing() {
        let mut a = Scene::new(8, 8, 25.0, 42);
        let mut b = Scene::new(8, 8, 25.0, 42);
        for _ in 0..20 {
            assert_eq!(a.next_interval(), b.next_interval());
        }
    }

    #[test]
    fn test_bar_moves() {
        let scene = Scene::new(64, 4, 25.0, 0);
        let mut first = SoftwareSurface::new(64, 4);
        let mut later = SoftwareSurface::new(64, 4);
        scene.render(&mut first, 0.0);
        scene.render(&mut later, 0.5);
        assert_ne!(first.pixels(), later.pixels());
        // Bar starts at the left edge.
        assert_eq!(&first.pixels()[..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_simulated_clock_does_not_sleep() {
        let mut clock = RenderClock::simulated();
        let wall = Instant::now();
        for _ in 0..100 {
            let now = clock.now();
            clock.advance(now, Duration::from_secs(1));
        }
        assert_eq!(clock.now(), Duration::from_secs(100));
        assert!(wall.elapsed() < Duration::from_secs(1));
    }
}
