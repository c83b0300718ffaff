//! Band-energy analysis using a real-input FFT

use crate::config::{AnalysisConfig, BandConfig};
use crate::error::AudioError;
use crate::smoothing::SmoothingWindow;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Bass,
    Mid,
    High,
}

/// Mean spectral magnitude inside one band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandEnergy {
    pub band: Band,
    pub magnitude: f32,
}

/// Published levels, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandLevels {
    /// Smoothed over the last few chunks
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
}

/// Turns sample chunks into normalized band levels
///
/// Owns the smoothing window; one analyzer per capture stream.
pub struct AudioAnalyzer {
    config: Arc<AnalysisConfig>,
    // Planned transforms by chunk length; the planner itself is not Send
    ffts: HashMap<usize, Arc<dyn Fft<f32>>>,
    smoothing: SmoothingWindow,
    sample_rate: u32,
}

impl AudioAnalyzer {
    /// Create a new audio analyzer
    pub fn new(config: AnalysisConfig, sample_rate: u32) -> Result<Self, AudioError> {
        config.validate(sample_rate).map_err(AudioError::Config)?;

        Ok(Self {
            smoothing: SmoothingWindow::new(config.smoothing_window),
            config: Arc::new(config),
            ffts: HashMap::new(),
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn smoothing(&self) -> &SmoothingWindow {
        &self.smoothing
    }

    /// Analyze one chunk. An empty chunk yields nothing and leaves the
    /// smoothing window untouched.
    pub fn process(&mut self, samples: &[f32]) -> Option<BandLevels> {
        if samples.is_empty() {
            return None;
        }

        let spectrum = self.real_fft(samples);
        let frequencies = bin_frequencies(samples.len(), self.sample_rate);
        let [bass, mid, high] = self.band_energies(&spectrum, &frequencies);

        let bass_level = normalize(bass.magnitude, self.config.bass.divisor);
        let levels = BandLevels {
            bass: self.smoothing.push(bass_level),
            mid: normalize(mid.magnitude, self.config.mid.divisor),
            high: normalize(high.magnitude, self.config.high.divisor),
        };

        trace!(
            "Band energies: bass={:.3} mid={:.3} high={:.3} -> {:?}",
            bass.magnitude,
            mid.magnitude,
            high.magnitude,
            levels
        );

        Some(levels)
    }

    /// Non-negative-frequency half of the spectrum, `n / 2 + 1` bins
    pub fn real_fft(&mut self, samples: &[f32]) -> Vec<Complex<f32>> {
        let n = samples.len();
        if n == 0 {
            return Vec::new();
        }

        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .map(|&s| Complex::new(if s.is_finite() { s } else { 0.0 }, 0.0))
            .collect();

        let fft = self
            .ffts
            .entry(n)
            .or_insert_with(|| FftPlanner::<f32>::new().plan_fft_forward(n));
        fft.process(&mut buffer);

        buffer.truncate(n / 2 + 1);
        buffer
    }

    /// Mean magnitude per band; a band with no bins has energy 0
    pub fn band_energies(&self, spectrum: &[Complex<f32>], frequencies: &[f32]) -> [BandEnergy; 3] {
        [
            BandEnergy { band: Band::Bass, magnitude: band_mean(spectrum, frequencies, &self.config.bass) },
            BandEnergy { band: Band::Mid, magnitude: band_mean(spectrum, frequencies, &self.config.mid) },
            BandEnergy { band: Band::High, magnitude: band_mean(spectrum, frequencies, &self.config.high) },
        ]
    }
}

/// Frequency (Hz) of each real-FFT bin for an `n`-sample chunk
pub fn bin_frequencies(n: usize, sample_rate: u32) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    let resolution = sample_rate as f32 / n as f32;
    (0..=n / 2).map(|k| k as f32 * resolution).collect()
}

/// Scale by the band divisor and clamp into [0, 1]
pub fn normalize(energy: f32, divisor: f32) -> f32 {
    let scaled = energy / divisor;
    if scaled.is_nan() {
        return 0.0;
    }
    scaled.clamp(0.0, 1.0)
}

fn band_mean(spectrum: &[Complex<f32>], frequencies: &[f32], band: &BandConfig) -> f32 {
    let (sum, count) = spectrum
        .iter()
        .zip(frequencies)
        .filter(|(_, hz)| band.contains(**hz))
        .fold((0.0f32, 0usize), |(sum, count), (bin, _)| (sum + bin.norm(), count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}
