use log::debug;

use crate::errors::SyncError;
use crate::providers::MediaInfo;
use crate::subtitle_processor::SubtitleTrack;

// @module: Framerate detection and conversion

// @const: Framerates a subtitle may have been authored for, in preference order
pub const FRAME_RATE_CANDIDATES: [f64; 8] = [23.976, 24.0, 25.0, 29.97, 30.0, 50.0, 59.94, 60.0];

/// Entries required before the subtitle framerate is guessed
pub const MIN_ENTRIES_FOR_DETECTION: usize = 100;

/// Distance from a whole frame count that still counts as aligned
pub const FRAME_ALIGNMENT_TOLERANCE: f64 = 0.1;

/// Share of aligned deltas the winning candidate needs
pub const MIN_ALIGNED_FRACTION: f64 = 0.3;

/// A rescale applied to a subtitle track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramerateAdjustment {
    /// Framerate the subtitle was authored for
    pub from_fps: f64,
    /// Framerate of the video
    pub to_fps: f64,
    /// Factor applied to every timestamp
    pub ratio: f64,
}

/// Video framerate from probe data
pub fn video_framerate(info: &MediaInfo) -> Result<f64, SyncError> {
    if info.frame_rate_den == 0 {
        return Err(SyncError::Probe("video framerate is unknown".to_string()));
    }

    let fps = info.frame_rate_num as f64 / info.frame_rate_den as f64;
    if !(fps.is_finite() && fps > 0.0) {
        return Err(SyncError::Probe(format!(
            "invalid video framerate {}/{}",
            info.frame_rate_num, info.frame_rate_den
        )));
    }
    Ok(fps)
}

/// Fraction of `deltas` that land on whole frames at `fps`
fn aligned_fraction(deltas: &[f64], fps: f64) -> f64 {
    let frame_ms = 1000.0 / fps;
    let aligned = deltas.iter()
        .filter(|delta| {
            let frames = *delta / frame_ms;
            (frames - frames.round()).abs() < FRAME_ALIGNMENT_TOLERANCE
        })
        .count();
    aligned as f64 / deltas.len() as f64
}

/// Guess the framerate a subtitle track was authored for
///
/// Returns `None` for short tracks or when no candidate explains enough of the
/// timestamp gaps.
pub fn detect_subtitle_framerate(track: &SubtitleTrack) -> Option<f64> {
    if track.len() < MIN_ENTRIES_FOR_DETECTION {
        debug!("Not guessing subtitle framerate from {} entries", track.len());
        return None;
    }

    let timestamps: Vec<u64> = track.entries.iter()
        .flat_map(|entry| [entry.start_time_ms, entry.end_time_ms])
        .collect();

    let deltas: Vec<f64> = timestamps.windows(2)
        .filter(|pair| pair[1] > pair[0])
        .map(|pair| (pair[1] - pair[0]) as f64)
        .collect();

    if deltas.is_empty() {
        return None;
    }

    let mut best: Option<(f64, f64)> = None;
    for fps in FRAME_RATE_CANDIDATES {
        let fraction = aligned_fraction(&deltas, fps);
        debug!("Framerate candidate {:.3}: {:.1}% aligned", fps, fraction * 100.0);
        // Strictly greater keeps the earlier candidate on ties
        if best.is_none_or(|(_, best_fraction)| fraction > best_fraction) {
            best = Some((fps, fraction));
        }
    }

    best.filter(|(_, fraction)| *fraction >= MIN_ALIGNED_FRACTION)
        .map(|(fps, _)| fps)
}

/// Whether two framerates differ enough to rescale the subtitle
pub fn needs_conversion(video_fps: f64, subtitle_fps: f64, tolerance: f64) -> bool {
    (video_fps - subtitle_fps).abs() > tolerance
}

/// Rescale every timestamp by `to_fps / from_fps`
pub fn convert_framerate(track: &mut SubtitleTrack, from_fps: f64, to_fps: f64) -> Result<FramerateAdjustment, SyncError> {
    let valid = |fps: f64| fps.is_finite() && fps > 0.0;
    if !valid(from_fps) || !valid(to_fps) {
        return Err(SyncError::Configuration(format!(
            "cannot convert framerate from {} to {}",
            from_fps, to_fps
        )));
    }

    let ratio = to_fps / from_fps;
    track.scale(ratio);

    Ok(FramerateAdjustment {
        from_fps,
        to_fps,
        ratio,
    })
}
