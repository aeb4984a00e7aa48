//! Signal fingerprints: cheap statistics over the leading bytes of a file that
//! still say something when two digests differ.
//!
//! Every measure is a pure function of the byte sample, so a fingerprint is
//! bit-for-bit reproducible for unchanged content:
//! 1. Shannon entropy over the 256 byte values
//! 2. Zero-crossing rate around the sample mean
//! 3. Spectral centroid (index-weighted centre of mass, no FFT)
//! 4. First 32 type-II DCT coefficients of a subsampled signal
//! 5. 64-bit perceptual digest over an 8x8 fold of the first 1KB

pub mod compare;

use crate::model::{SignalFingerprint, DCT_COEFFICIENTS};
use std::f64::consts::PI;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub use compare::{compare, FingerprintDistance};

pub const SAMPLE_LENGTH: usize = 65536; // 64KB
pub const DCT_MAX_POINTS: usize = 512;
pub const PERCEPTUAL_LENGTH: usize = 1024; // 1KB
const GRID: usize = 8;

pub fn fingerprint(path: &Path) -> io::Result<SignalFingerprint> {
    let sample = read_sample(path)?;
    Ok(from_sample(&sample))
}

pub fn from_sample(sample: &[u8]) -> SignalFingerprint {
    let signal: Vec<f64> = sample.iter().map(|b| f64::from(*b) / 255.0).collect();

    SignalFingerprint {
        entropy: entropy(sample),
        zero_crossing_rate: zero_crossing_rate(&signal),
        spectral_centroid: spectral_centroid(&signal),
        dct_coefficients: dct_coefficients(&signal),
        perceptual_digest: perceptual_digest(sample),
    }
}

fn read_sample(path: &Path) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut buffer = Vec::with_capacity(SAMPLE_LENGTH);
    file.take(SAMPLE_LENGTH as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn entropy(sample: &[u8]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }

    let mut bins = [0u64; 256];
    for b in sample {
        bins[*b as usize] += 1;
    }

    let total = sample.len() as f64;
    let h = bins
        .iter()
        .filter(|count| **count > 0)
        .map(|count| {
            let p = *count as f64 / total;
            -p * p.log2()
        })
        .sum::<f64>();
    // A single-bin distribution sums to -0.0.
    h.max(0.0)
}

fn zero_crossing_rate(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }

    let mean = signal.iter().sum::<f64>() / signal.len() as f64;
    let crossings = signal
        .windows(2)
        .filter(|pair| (pair[0] - mean >= 0.0) != (pair[1] - mean >= 0.0))
        .count();
    crossings as f64 / signal.len() as f64
}

fn spectral_centroid(signal: &[f64]) -> f64 {
    let normalizer: f64 = signal.iter().map(|x| x.abs()).sum();
    if normalizer == 0.0 {
        return 0.0;
    }

    let weighted: f64 = signal
        .iter()
        .enumerate()
        .map(|(i, x)| i as f64 * x.abs())
        .sum();
    weighted / normalizer / signal.len() as f64
}

/// Direct O(N*K) type-II DCT over at most 512 evenly strided points.
fn dct_coefficients(signal: &[f64]) -> [f64; DCT_COEFFICIENTS] {
    let mut coefficients = [0.0; DCT_COEFFICIENTS];

    let step = (signal.len() / DCT_MAX_POINTS).max(1);
    let points: Vec<f64> = signal
        .iter()
        .step_by(step)
        .take(DCT_MAX_POINTS)
        .copied()
        .collect();
    if points.is_empty() {
        return coefficients;
    }

    let n = points.len() as f64;
    for (k, coefficient) in coefficients.iter_mut().enumerate() {
        let sum: f64 = points
            .iter()
            .enumerate()
            .map(|(i, x)| x * (PI / n * (i as f64 + 0.5) * k as f64).cos())
            .sum();
        *coefficient = sum / n;
    }
    coefficients
}

fn perceptual_digest(sample: &[u8]) -> String {
    let mut grid = [[0.0f64; GRID]; GRID];
    for (i, b) in sample.iter().take(PERCEPTUAL_LENGTH).enumerate() {
        grid[(i / GRID) % GRID][i % GRID] += f64::from(*b);
    }

    let mean = grid.iter().flatten().sum::<f64>() / (GRID * GRID) as f64;
    let bits: Vec<bool> = grid.iter().flatten().map(|cell| *cell > mean).collect();

    bits.chunks(4)
        .map(|nibble| {
            let value = nibble
                .iter()
                .fold(0u32, |acc, bit| (acc << 1) | u32::from(*bit));
            // nibble values are always < 16
            char::from_digit(value, 16).unwrap_or('0')
        })
        .collect()
}
