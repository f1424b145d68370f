//! Variable-to-constant frame rate conversion.
//!
//! Output tick `n` sits at `session_start + n / output_fps` on the render
//! clock, where `session_start` is the timestamp of the first capture. Every
//! arriving capture releases all ticks up to its own timestamp, so the output
//! timeline is driven purely by timestamps and never skips or repeats an
//! index. Conversion is synchronous; no wall-clock pacing is applied.

use crate::capture::CapturedFrame;
use crate::error::RecorderError;
use std::sync::Arc;
use std::time::Duration;
use steadyrec_common::ConversionPolicy;
use tracing::warn;

/// Timestamps closer than this (seconds) are treated as coincident.
pub const TIMESTAMP_TOLERANCE: f64 = 1e-6;

/// Highest accepted frame rate, input or output.
pub const MAX_FRAME_RATE: f64 = 1000.0;

/// Pixel content of an output frame.
#[derive(Debug, Clone)]
pub enum FramePixels {
    /// A capture reused unchanged, shared read-only with other output frames
    Held(Arc<CapturedFrame>),
    /// A per-pixel linear blend of two captures
    Blended { data: Vec<u8>, alpha: f64 },
}

/// One frame of the constant-rate output stream.
#[derive(Debug, Clone)]
pub struct OutputFrame {
    index: u64,
    pts: Duration,
    width: u32,
    height: u32,
    pixels: FramePixels,
}

impl OutputFrame {
    /// Position in the output stream, starting at 0.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Presentation time relative to the first output frame.
    pub fn pts(&self) -> Duration {
        self.pts
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Tightly packed BGRA bytes.
    pub fn data(&self) -> &[u8] {
        match &self.pixels {
            FramePixels::Held(frame) => frame.data(),
            FramePixels::Blended { data, .. } => data,
        }
    }

    pub fn pixels(&self) -> &FramePixels {
        &self.pixels
    }

    /// Sequence number of the capture this frame reuses, if it was not blended.
    pub fn held_sequence(&self) -> Option<u64> {
        match &self.pixels {
            FramePixels::Held(frame) => Some(frame.sequence()),
            FramePixels::Blended { .. } => None,
        }
    }
}

/// Running counters for one conversion session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub input_frames: u64,
    pub output_frames: u64,
    pub held_frames: u64,
    pub blended_frames: u64,
}

/// Maps irregularly timed captures onto a fixed-interval output timeline.
pub struct RateConverter {
    policy: ConversionPolicy,
    output_fps: f64,
    session_start: Option<Duration>,
    next_index: u64,
    previous: Option<Arc<CapturedFrame>>,
    stats: ConversionStats,
}

impl RateConverter {
    pub fn new(policy: ConversionPolicy, output_fps: f64) -> Result<Self, RecorderError> {
        if !output_fps.is_finite() || output_fps <= 0.0 || output_fps > MAX_FRAME_RATE {
            return Err(RecorderError::InvalidConfig(format!(
                "output frame rate must be in (0, {}], got {}",
                MAX_FRAME_RATE, output_fps
            )));
        }
        Ok(Self {
            policy,
            output_fps,
            session_start: None,
            next_index: 0,
            previous: None,
            stats: ConversionStats::default(),
        })
    }

    pub fn policy(&self) -> ConversionPolicy {
        self.policy
    }

    pub fn stats(&self) -> ConversionStats {
        self.stats
    }

    /// Timestamp of the first capture, once one has arrived.
    pub fn session_start(&self) -> Option<Duration> {
        self.session_start
    }

    /// Render-clock time of the next output tick, once the session has started.
    pub fn next_output_time(&self) -> Option<Duration> {
        self.session_start
            .map(|start| start + Duration::from_secs_f64(self.tick_offset(self.next_index)))
    }

    /// Consume one capture and hand each output frame it completes to `emit`,
    /// in index order.
    ///
    /// Frames are built one at a time; the next tick is not resolved until
    /// `emit` returns, so a blocking `emit` bounds memory across long gaps.
    /// An error from `emit` stops the conversion and is returned. Nothing is
    /// emitted when the capture lands before the next tick.
    pub fn on_frame_available<F>(&mut self, frame: CapturedFrame, mut emit: F) -> Result<(), RecorderError>
    where
        F: FnMut(OutputFrame) -> Result<(), RecorderError>,
    {
        self.stats.input_frames += 1;
        let start = *self.session_start.get_or_insert(frame.timestamp());

        let frame = match &self.previous {
            Some(prev) if frame.timestamp() < prev.timestamp() => {
                warn!(
                    "Capture {} is older than capture {}, treating as simultaneous",
                    frame.sequence(),
                    prev.sequence()
                );
                frame.with_timestamp(prev.timestamp())
            }
            _ => frame,
        };
        let current = Arc::new(frame);
        let t = seconds_since(current.timestamp(), start);

        let mut result = Ok(());
        loop {
            let tick = self.tick_offset(self.next_index);
            if tick > t + TIMESTAMP_TOLERANCE {
                break;
            }

            let pixels = self.resolve(tick, t, &current, start);
            match pixels {
                FramePixels::Held(_) => self.stats.held_frames += 1,
                FramePixels::Blended { .. } => self.stats.blended_frames += 1,
            }
            let output = OutputFrame {
                index: self.next_index,
                pts: Duration::from_secs_f64(tick),
                width: current.width(),
                height: current.height(),
                pixels,
            };
            self.next_index += 1;
            self.stats.output_frames += 1;

            if let Err(e) = emit(output) {
                result = Err(e);
                break;
            }
        }

        self.previous = Some(current);
        result
    }

    /// Pick or synthesize the frame for an output tick at `tick` seconds
    /// (session-relative) given the capture at `t`.
    fn resolve(
        &self,
        tick: f64,
        t: f64,
        current: &Arc<CapturedFrame>,
        start: Duration,
    ) -> FramePixels {
        // The very first tick has no pair to work with.
        let Some(prev) = &self.previous else {
            return FramePixels::Held(current.clone());
        };

        if t - tick <= TIMESTAMP_TOLERANCE {
            return FramePixels::Held(current.clone());
        }

        let t0 = seconds_since(prev.timestamp(), start);
        match self.policy {
            ConversionPolicy::Constant => FramePixels::Held(prev.clone()),
            ConversionPolicy::Interpolate => {
                let span = t - t0;
                if span <= TIMESTAMP_TOLERANCE {
                    return FramePixels::Held(current.clone());
                }
                let alpha = ((tick - t0) / span).clamp(0.0, 1.0);
                if tick - t0 <= TIMESTAMP_TOLERANCE {
                    return FramePixels::Held(prev.clone());
                }
                FramePixels::Blended {
                    data: blend(prev.data(), current.data(), alpha),
                    alpha,
                }
            }
        }
    }

    fn tick_offset(&self, index: u64) -> f64 {
        index as f64 / self.output_fps
    }
}

fn seconds_since(timestamp: Duration, start: Duration) -> f64 {
    timestamp.saturating_sub(start).as_secs_f64()
}

/// Per-channel `(1 - alpha) * a + alpha * b`, rounded to nearest.
pub fn blend(a: &[u8], b: &[u8], alpha: f64) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len());
    // 16.16 fixed point
    let w = (alpha.clamp(0.0, 1.0) * 65536.0).round() as u32;
    let inv = 65536 - w;
    a.iter()
        .zip(b)
        .map(|(&a, &b)| ((a as u32 * inv + b as u32 * w + 32768) >> 16) as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(value: u8, at: Duration, seq: u64) -> CapturedFrame {
        CapturedFrame::new(2, 1, vec![value; 8], at, seq).unwrap()
    }

    fn secs(v: f64) -> Duration {
        Duration::from_secs_f64(v)
    }

    /// Convert one capture and collect what it releases.
    fn push(converter: &mut RateConverter, frame: CapturedFrame) -> Vec<OutputFrame> {
        let mut out = Vec::new();
        converter
            .on_frame_available(frame, |f| {
                out.push(f);
                Ok(())
            })
            .unwrap();
        out
    }

    fn feed(converter: &mut RateConverter, frames: Vec<CapturedFrame>) -> Vec<OutputFrame> {
        frames.into_iter().flat_map(|f| push(converter, f)).collect()
    }

    #[test]
    fn test_constant_halves_60_to_30() {
        let mut converter = RateConverter::new(ConversionPolicy::Constant, 30.0).unwrap();
        let frames = (0..60)
            .map(|i| solid(i as u8, Duration::from_secs(i) / 60, i))
            .collect();
        let out = feed(&mut converter, frames);

        assert_eq!(out.len(), 30);
        for (k, frame) in out.iter().enumerate() {
            assert_eq!(frame.index(), k as u64);
            assert_eq!(frame.held_sequence(), Some(2 * k as u64));
        }
    }

    #[test]
    fn test_interpolate_black_to_white_ramp() {
        let mut converter = RateConverter::new(ConversionPolicy::Interpolate, 4.0).unwrap();
        let out = feed(
            &mut converter,
            vec![solid(0, secs(0.0), 0), solid(255, secs(1.0), 1)],
        );

        let expected = [0.0, 63.75, 127.5, 191.25, 255.0];
        assert_eq!(out.len(), expected.len());
        for (frame, level) in out.iter().zip(expected) {
            for &px in frame.data() {
                assert!((px as f64 - level).abs() <= 1.0, "{} vs {}", px, level);
            }
        }
        assert_eq!(out[0].held_sequence(), Some(0));
        assert_eq!(out[4].held_sequence(), Some(1));
        assert_eq!(converter.stats().blended_frames, 3);
    }

    #[test]
    fn test_first_tick_emits_first_capture_unmodified() {
        for policy in [ConversionPolicy::Constant, ConversionPolicy::Interpolate] {
            let mut converter = RateConverter::new(policy, 30.0).unwrap();
            let out = push(&mut converter, solid(77, secs(12.5), 0));
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].index(), 0);
            assert_eq!(out[0].pts(), Duration::ZERO);
            assert_eq!(out[0].data(), &[77; 8]);
            assert_eq!(converter.session_start(), Some(secs(12.5)));
        }
    }

    #[test]
    fn test_output_count_matches_timeline() {
        // Jittered input around 25 Hz into 21 Hz output.
        let stamps_ms: Vec<u64> = (0..200u64).map(|i| i * 40 + (i * 7919) % 23).collect();
        for policy in [ConversionPolicy::Constant, ConversionPolicy::Interpolate] {
            let mut converter = RateConverter::new(policy, 21.0).unwrap();
            let frames = stamps_ms
                .iter()
                .enumerate()
                .map(|(i, &ms)| solid(i as u8, Duration::from_millis(ms), i as u64))
                .collect();
            let out = feed(&mut converter, frames);

            let span_ms = stamps_ms.last().unwrap() - stamps_ms[0];
            let expected = span_ms * 21 / 1000 + 1;
            assert_eq!(out.len() as u64, expected);
            for (k, frame) in out.iter().enumerate() {
                assert_eq!(frame.index(), k as u64);
            }
        }
    }

    #[test]
    fn test_constant_never_blends() {
        let mut converter = RateConverter::new(ConversionPolicy::Constant, 50.0).unwrap();
        let frames = [0u64, 13, 61, 62, 140, 333]
            .iter()
            .enumerate()
            .map(|(i, &ms)| solid(i as u8 * 40, Duration::from_millis(ms), i as u64))
            .collect();
        let out = feed(&mut converter, frames);
        assert!(!out.is_empty());
        for frame in &out {
            let seq = frame.held_sequence().expect("constant policy must not blend");
            assert_eq!(frame.data(), &[seq as u8 * 40; 8]);
        }
        assert_eq!(converter.stats().blended_frames, 0);
    }

    #[test]
    fn test_slow_input_holds_previous_frame() {
        let mut converter = RateConverter::new(ConversionPolicy::Constant, 10.0).unwrap();
        push(&mut converter, solid(1, secs(0.0), 0));
        let out = push(&mut converter, solid(2, secs(0.55), 1));
        // Ticks at 0.1 .. 0.5 all precede the new capture.
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|f| f.held_sequence() == Some(0)));
        assert_eq!(converter.next_output_time(), Some(secs(0.6)));
    }

    #[test]
    fn test_simultaneous_captures_do_not_divide_by_zero() {
        let mut converter = RateConverter::new(ConversionPolicy::Interpolate, 30.0).unwrap();
        push(&mut converter, solid(10, secs(0.0), 0));
        assert!(push(&mut converter, solid(20, secs(0.0), 1)).is_empty());
        let out = push(&mut converter, solid(30, secs(0.1), 2));
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|f| f.data().len() == 8));
    }

    #[test]
    fn test_capture_between_ticks_emits_nothing() {
        let mut converter = RateConverter::new(ConversionPolicy::Interpolate, 10.0).unwrap();
        push(&mut converter, solid(0, secs(0.0), 0));
        assert!(push(&mut converter, solid(9, secs(0.05), 1)).is_empty());
        let out = push(&mut converter, solid(9, secs(0.15), 2));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].index(), 1);
    }

    #[test]
    fn test_blend_weights() {
        assert_eq!(blend(&[0, 100], &[200, 100], 0.5), vec![100, 100]);
        assert_eq!(blend(&[10], &[250], 0.0), vec![10]);
        assert_eq!(blend(&[10], &[250], 1.0), vec![250]);
    }

    #[test]
    fn test_rejects_bad_rate() {
        assert!(RateConverter::new(ConversionPolicy::Constant, 0.0).is_err());
        assert!(RateConverter::new(ConversionPolicy::Constant, f64::NAN).is_err());
        assert!(RateConverter::new(ConversionPolicy::Constant, 1e20).is_err());
        assert!(RateConverter::new(ConversionPolicy::Constant, MAX_FRAME_RATE).is_ok());
    }

    #[test]
    fn test_long_gap_releases_every_tick_in_order() {
        let mut converter = RateConverter::new(ConversionPolicy::Interpolate, 30.0).unwrap();
        push(&mut converter, solid(0, secs(0.0), 0));

        // A ten second stall releases 300 ticks.
        let mut emitted = 0;
        let mut largest = 0;
        converter
            .on_frame_available(solid(255, secs(10.0), 1), |frame| {
                emitted += 1;
                largest = largest.max(frame.data().len());
                assert_eq!(frame.index(), emitted);
                Ok(())
            })
            .unwrap();
        assert_eq!(emitted, 300);
        assert_eq!(largest, 8);
    }

    #[test]
    fn test_emit_error_stops_conversion() {
        let mut converter = RateConverter::new(ConversionPolicy::Interpolate, 30.0).unwrap();
        push(&mut converter, solid(0, secs(0.0), 0));

        let mut seen = 0;
        let result = converter.on_frame_available(solid(255, secs(10.0), 1), |_| {
            seen += 1;
            if seen == 3 {
                Err(RecorderError::Encode("pipe closed".to_string()))
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err(RecorderError::Encode("pipe closed".to_string())));
        assert_eq!(seen, 3);
        let stats = converter.stats();
        // First tick plus the three handed over; the rest were never built.
        assert_eq!(stats.output_frames, 4);
        assert_eq!(stats.blended_frames, 3);
    }

    #[test]
    fn test_stale_capture_is_restamped() {
        let mut converter = RateConverter::new(ConversionPolicy::Interpolate, 4.0).unwrap();
        push(&mut converter, solid(0, secs(0.0), 0));
        assert!(push(&mut converter, solid(100, secs(0.2), 1)).is_empty());
        // Older than the previous capture: held at 0.2s, releases nothing.
        assert!(push(&mut converter, solid(200, secs(0.1), 2)).is_empty());

        let out = push(&mut converter, solid(250, secs(0.3), 3));
        assert_eq!(out.len(), 1);
        match out[0].pixels() {
            FramePixels::Blended { alpha, .. } => assert!((alpha - 0.5).abs() < 1e-9),
            other => panic!("expected a blend, got {:?}", other),
        }
        assert_eq!(out[0].data(), &[225; 8]);
    }
}
