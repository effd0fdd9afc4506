//! # Voice Activity Detection
//!
//! Splits a clip into voiced spans using per-frame RMS energy so silent
//! stretches are skipped instead of being decoded. Gaps shorter than the
//! silence threshold are bridged, which keeps natural pauses inside a single
//! span instead of fragmenting a sentence.

/// Tuning for the energy-based detector.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Analysis frame length in milliseconds
    pub frame_ms: u32,
    /// RMS level a frame must exceed to count as speech
    pub energy_threshold: f32,
    /// Minimum silence gap that separates two spans
    pub min_silence_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            frame_ms: 30,
            energy_threshold: 0.01,
            // Matches the decoding strategy of skipping silence gaps of
            // roughly 300ms and above.
            min_silence_ms: 300,
        }
    }
}

/// One contiguous voiced region, in sample offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoicedSpan {
    pub start: usize,
    pub end: usize,
}

/// Detect voiced spans in 16 kHz mono samples.
///
/// Spans come back in chronological order with non-overlapping, in-bounds
/// sample ranges. A fully silent clip yields no spans.
pub fn detect_voiced_spans(samples: &[f32], sample_rate: u32, config: &VadConfig) -> Vec<VoicedSpan> {
    if samples.is_empty() {
        return Vec::new();
    }

    let frame_len = ((sample_rate * config.frame_ms) / 1000).max(1) as usize;
    let max_gap_frames = (config.min_silence_ms / config.frame_ms.max(1)) as usize;

    // Classify each frame by RMS energy.
    let voiced: Vec<bool> = samples
        .chunks(frame_len)
        .map(|frame| rms(frame) > config.energy_threshold)
        .collect();

    let mut spans: Vec<VoicedSpan> = Vec::new();
    let mut current: Option<(usize, usize)> = None; // (start_frame, end_frame)
    let mut gap = 0usize;

    for (i, &is_voiced) in voiced.iter().enumerate() {
        if is_voiced {
            current = match current {
                Some((start, _)) => Some((start, i + 1)),
                None => Some((i, i + 1)),
            };
            gap = 0;
        } else if let Some((start, end)) = current {
            gap += 1;
            if gap >= max_gap_frames.max(1) {
                spans.push(frames_to_span(start, end, frame_len, samples.len()));
                current = None;
            }
        }
    }

    if let Some((start, end)) = current {
        spans.push(frames_to_span(start, end, frame_len, samples.len()));
    }

    spans
}

fn frames_to_span(start_frame: usize, end_frame: usize, frame_len: usize, total: usize) -> VoicedSpan {
    VoicedSpan {
        start: (start_frame * frame_len).min(total),
        end: (end_frame * frame_len).min(total),
    }
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let energy: f32 = frame.iter().map(|s| s * s).sum();
    (energy / frame.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn tone(seconds: f32) -> Vec<f32> {
        let len = (seconds * RATE as f32) as usize;
        (0..len)
            .map(|i| (i as f32 * 2.0 * std::f32::consts::PI * 440.0 / RATE as f32).sin() * 0.3)
            .collect()
    }

    fn silence(seconds: f32) -> Vec<f32> {
        vec![0.0; (seconds * RATE as f32) as usize]
    }

    #[test]
    fn test_silence_has_no_spans() {
        let spans = detect_voiced_spans(&silence(1.0), RATE, &VadConfig::default());
        assert!(spans.is_empty());
    }

    #[test]
    fn test_tone_is_one_span() {
        let spans = detect_voiced_spans(&tone(1.0), RATE, &VadConfig::default());
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0);
        assert!(spans[0].end as f32 >= 0.9 * RATE as f32);
    }

    #[test]
    fn test_short_pause_is_bridged() {
        let mut samples = tone(0.5);
        samples.extend(silence(0.2)); // below the 300ms gap
        samples.extend(tone(0.5));
        let spans = detect_voiced_spans(&samples, RATE, &VadConfig::default());
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_long_pause_splits_spans() {
        let mut samples = tone(0.5);
        samples.extend(silence(0.6)); // well above the 300ms gap
        samples.extend(tone(0.5));
        let spans = detect_voiced_spans(&samples, RATE, &VadConfig::default());
        assert_eq!(spans.len(), 2);
        assert!(spans[0].end <= spans[1].start);
    }

    #[test]
    fn test_spans_stay_in_bounds() {
        let samples = tone(0.731); // awkward length, not frame-aligned
        let spans = detect_voiced_spans(&samples, RATE, &VadConfig::default());
        for span in spans {
            assert!(span.start <= span.end);
            assert!(span.end <= samples.len());
        }
    }
}
