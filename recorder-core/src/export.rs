//! # Export Module
//!
//! Writes a finished rolling window to a mono 16-bit PCM WAV file.
//!
//! Samples are peak-normalized: the loudest sample maps to ±32767. A window
//! of pure silence has no peak to divide by and is written as all zeros.

use std::path::{Path, PathBuf};

use hound::{WavSpec, WavWriter};
use log::info;

use crate::error::{RecorderError, Result};

/// File stem used when the user leaves the name empty.
pub const DEFAULT_FILE_STEM: &str = "recording";

/// Scales samples so the largest magnitude becomes `i16::MAX`.
///
/// Silence (no non-zero finite sample) yields all zeros instead of dividing
/// by zero. NaN samples become 0.
pub fn normalize_to_pcm16(samples: &[f32]) -> Vec<i16> {
    let peak = samples
        .iter()
        .filter(|s| s.is_finite())
        .fold(0.0f32, |max, &s| max.max(s.abs()));

    if peak == 0.0 {
        return vec![0; samples.len()];
    }

    let scale = i16::MAX as f32 / peak;
    samples
        .iter()
        // `as` saturates and maps NaN to 0.
        .map(|&s| (s * scale).round() as i16)
        .collect()
}

/// Builds `<output_dir>/<name>.wav` from a user-typed name.
///
/// Surrounding whitespace is trimmed, an empty name becomes
/// `recording`, and a trailing `.wav` is not doubled.
pub fn resolve_export_path(output_dir: &Path, name: &str) -> PathBuf {
    let name = name.trim();
    let stem = name.strip_suffix(".wav").unwrap_or(name);
    let stem = if stem.is_empty() { DEFAULT_FILE_STEM } else { stem };
    output_dir.join(format!("{}.wav", stem))
}

/// Writes `samples` as a normalized mono 16-bit WAV file.
///
/// # Arguments
/// * `samples` - Rolling window, oldest sample first
/// * `sample_rate` - Sample rate in Hz written to the header
/// * `path` - Output file, created or truncated
pub fn export_wav(samples: &[f32], sample_rate: u32, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| RecorderError::ExportIo(format!("{}: {}", parent.display(), e)))?;
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for sample in normalize_to_pcm16(samples) {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!(
        "[EXPORT] Wrote {} samples at {} Hz to {}",
        samples.len(),
        sample_rate,
        path.display()
    );
    Ok(())
}
