//! # Fast Fourier Transform (FFT) Module
//!
//! Spectral analysis of the whole rolling window. Every cycle re-derives the
//! spectrum from the full buffer; nothing is carried between cycles except
//! the cached FFT plan and scratch space for the current length.
//!
//! ## Output
//! - Magnitudes are `|X[k]|` of the raw transform, not divided by N
//! - Only the first N/2 bins are kept (real input, upper half is redundant)
//! - Bin k sits at `k * sample_rate / N` Hz
//! - Bins above the configured max frequency are cut off
//!
//! N is the window length and does not have to be a power of two.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner, Length};

use crate::buffer::has_signal;

/// Magnitude spectrum of one analysis cycle.
///
/// `frequencies` and `magnitudes` are parallel; frequencies are strictly
/// ascending. A buffer of pure silence yields `has_signal == false` and empty
/// sequences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    pub frequencies: Vec<f32>,
    pub magnitudes: Vec<f32>,
    pub has_signal: bool,
}

impl Spectrum {
    /// The "no data to display" result for an all-zero buffer.
    pub fn no_signal() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Frequency spacing between adjacent bins for a window of `n` samples.
    pub fn bin_width(sample_rate: u32, n: usize) -> f32 {
        sample_rate as f32 / n as f32
    }

    /// Strongest bin as `(frequency, magnitude)`, ignoring NaN magnitudes.
    pub fn peak(&self) -> Option<(f32, f32)> {
        self.frequencies
            .iter()
            .zip(self.magnitudes.iter())
            .filter(|(_, m)| !m.is_nan())
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(&f, &m)| (f, m))
    }
}

/// Reusable analyzer. Keeps the FFT plan for the last window length so that
/// back-to-back cycles on the same session do not re-plan.
pub struct SpectralAnalyzer {
    planner: FftPlanner<f32>,
    plan: Option<Arc<dyn Fft<f32>>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("planned_len", &self.plan.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            plan: None,
            buffer: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Computes the magnitude spectrum of `samples`.
    ///
    /// # Arguments
    /// * `samples` - Full rolling window, oldest sample first
    /// * `sample_rate` - Sample rate in Hz
    /// * `max_frequency` - Highest frequency to keep, in Hz
    ///
    /// # Returns
    /// * `Spectrum::no_signal()` when every sample is zero (the transform is skipped)
    /// * Otherwise bins `0..N/2` with frequency `<= max_frequency`
    pub fn analyze(&mut self, samples: &[f32], sample_rate: u32, max_frequency: f32) -> Spectrum {
        if !has_signal(samples) {
            return Spectrum::no_signal();
        }

        let n = samples.len();
        let fft = self.plan_for(n);

        self.buffer.clear();
        self.buffer
            .extend(samples.iter().map(|&sample| Complex { re: sample, im: 0.0 }));
        let scratch_len = fft.get_inplace_scratch_len();
        if self.scratch.len() < scratch_len {
            self.scratch.resize(scratch_len, Complex::default());
        }
        fft.process_with_scratch(&mut self.buffer, &mut self.scratch[..scratch_len]);

        let max_frequency = f64::from(max_frequency);
        let kept = (0..n / 2)
            .take_while(|&k| bin_frequency(k, sample_rate, n) <= max_frequency)
            .count();

        Spectrum {
            frequencies: (0..kept)
                .map(|k| bin_frequency(k, sample_rate, n) as f32)
                .collect(),
            magnitudes: self.buffer[..kept].iter().map(|c| c.norm()).collect(),
            has_signal: true,
        }
    }

    fn plan_for(&mut self, n: usize) -> Arc<dyn Fft<f32>> {
        match &self.plan {
            Some(plan) if plan.len() == n => Arc::clone(plan),
            _ => {
                let plan = self.planner.plan_fft_forward(n);
                self.plan = Some(Arc::clone(&plan));
                plan
            }
        }
    }
}

/// Exact `k * sample_rate / n` in f64, so a bin sitting on the cut is kept.
fn bin_frequency(k: usize, sample_rate: u32, n: usize) -> f64 {
    k as f64 * f64::from(sample_rate) / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_silence_reports_no_signal() {
        let mut analyzer = SpectralAnalyzer::new();
        for len in [1, 7, 1000, 40_000] {
            let spectrum = analyzer.analyze(&vec![0.0; len], 40_000, 20_000.0);
            assert!(!spectrum.has_signal);
            assert!(spectrum.is_empty());
            assert!(spectrum.frequencies.is_empty());
        }
        // The transform was never planned.
        assert!(analyzer.plan.is_none());
    }

    #[test]
    fn test_sine_peaks_at_nearest_bin() {
        let mut analyzer = SpectralAnalyzer::new();
        let sample_rate = 8000;
        // Non power-of-two length, tone between two bins.
        let n = 3000;
        let freq = 1234.5;
        let spectrum = analyzer.analyze(&sine(freq, sample_rate, n), sample_rate, 4000.0);

        let (peak_freq, _) = spectrum.peak().unwrap();
        let bin_width = Spectrum::bin_width(sample_rate, n);
        assert!(
            (peak_freq - freq).abs() <= bin_width,
            "peak at {} Hz, expected {} Hz +/- {}",
            peak_freq,
            freq,
            bin_width
        );
    }

    #[test]
    fn test_magnitudes_are_not_normalized() {
        let mut analyzer = SpectralAnalyzer::new();
        let sample_rate = 1000;
        let n = 1000;
        // Exactly on bin 50: |X[50]| = N/2 for a unit sine.
        let spectrum = analyzer.analyze(&sine(50.0, sample_rate, n), sample_rate, 500.0);
        let magnitude = spectrum.magnitudes[50];
        assert!((magnitude - 500.0).abs() < 1.0, "got {}", magnitude);
    }

    #[test]
    fn test_frequencies_ascending_and_capped() {
        let mut analyzer = SpectralAnalyzer::new();
        let spectrum = analyzer.analyze(&sine(300.0, 4000, 999), 4000, 1000.0);
        assert!(spectrum.has_signal);
        assert!(spectrum.frequencies.windows(2).all(|w| w[0] < w[1]));
        assert!(spectrum.frequencies.iter().all(|&f| f <= 1000.0));
        assert_eq!(spectrum.frequencies.len(), spectrum.magnitudes.len());
        assert_eq!(spectrum.frequencies[0], 0.0);
    }

    #[test]
    fn test_bin_exactly_on_max_frequency_is_kept() {
        let mut analyzer = SpectralAnalyzer::new();
        let sample_rate = 48_000;
        // 7 s window: bin 7000 sits at exactly 1000 Hz.
        let n = 48_000 * 7;
        let spectrum = analyzer.analyze(&sine(440.0, sample_rate, n), sample_rate, 1000.0);
        assert_eq!(spectrum.len(), 7001);
        assert_eq!(spectrum.frequencies.last().copied(), Some(1000.0));
    }

    #[test]
    fn test_frequencies_do_not_drift_at_high_bins() {
        let mut analyzer = SpectralAnalyzer::new();
        // Default window: 600 000 samples at 40 kHz.
        let n = 600_000;
        let spectrum = analyzer.analyze(&sine(1000.0, 40_000, n), 40_000, 20_000.0);
        assert_eq!(spectrum.len(), n / 2);
        assert_eq!(spectrum.frequencies[299_999], (299_999.0f64 / 15.0) as f32);
    }

    #[test]
    fn test_max_frequency_above_nyquist_stops_at_half_length() {
        let mut analyzer = SpectralAnalyzer::new();
        let spectrum = analyzer.analyze(&sine(100.0, 1000, 101), 1000, 10_000.0);
        assert_eq!(spectrum.len(), 101 / 2);
        assert!(spectrum.frequencies.iter().all(|&f| f < 500.0));
    }

    #[test]
    fn test_nan_propagates_without_panic() {
        let mut analyzer = SpectralAnalyzer::new();
        let mut samples = sine(100.0, 1000, 200);
        samples[10] = f32::NAN;
        let spectrum = analyzer.analyze(&samples, 1000, 500.0);
        assert!(spectrum.has_signal);
        assert!(spectrum.magnitudes.iter().any(|m| m.is_nan()));
    }

    #[test]
    fn test_plan_is_reused_for_same_length() {
        let mut analyzer = SpectralAnalyzer::new();
        let samples = sine(100.0, 1000, 512);
        let first = analyzer.analyze(&samples, 1000, 500.0);
        let second = analyzer.analyze(&samples, 1000, 500.0);
        assert_eq!(first, second);
        assert_eq!(analyzer.plan.as_ref().map(|p| p.len()), Some(512));
    }
}
