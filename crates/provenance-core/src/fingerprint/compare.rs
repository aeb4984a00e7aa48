use crate::model::SignalFingerprint;
use serde::Serialize;

/// How far apart two fingerprints are. Used to characterise drift between two
/// versions of a file whose digests no longer match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FingerprintDistance {
    /// Differing bits between the 64-bit perceptual digests.
    pub perceptual_hamming: u32,
    pub dct_cosine: f64,
    pub entropy_delta: f64,
    /// Combined score in [0, 1]; 1.0 for identical fingerprints.
    pub similarity: f64,
}

pub fn compare(a: &SignalFingerprint, b: &SignalFingerprint) -> FingerprintDistance {
    let perceptual_hamming = match (
        u64::from_str_radix(&a.perceptual_digest, 16),
        u64::from_str_radix(&b.perceptual_digest, 16),
    ) {
        (Ok(x), Ok(y)) => (x ^ y).count_ones(),
        _ => 64,
    };

    let dct_cosine = cosine(&a.dct_coefficients, &b.dct_coefficients);
    let entropy_delta = (a.entropy - b.entropy).abs();

    let perceptual_score = 1.0 - f64::from(perceptual_hamming) / 64.0;
    let spectral_score = dct_cosine.clamp(0.0, 1.0);
    let entropy_score = 1.0 - (entropy_delta / 8.0).min(1.0);
    let similarity = (perceptual_score + spectral_score + entropy_score) / 3.0;

    FingerprintDistance {
        perceptual_hamming,
        dct_cosine,
        entropy_delta,
        similarity,
    }
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    match (norm_a == 0.0, norm_b == 0.0) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        _ => dot / (norm_a * norm_b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::from_sample;

    #[test]
    fn test_identical_fingerprints_are_fully_similar() {
        let sample: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 256) as u8).collect();
        let fp = from_sample(&sample);
        let distance = compare(&fp, &fp);
        assert_eq!(distance.perceptual_hamming, 0);
        assert_eq!(distance.entropy_delta, 0.0);
        assert!((distance.similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_small_corruption_stays_closer_than_unrelated_content() {
        let original: Vec<u8> = (0..8192u32).map(|i| ((i / 32) % 256) as u8).collect();
        let mut corrupted = original.clone();
        corrupted[4000..4010].fill(0xFF);
        let unrelated = vec![0u8; 8192];

        let base = from_sample(&original);
        let near = compare(&base, &from_sample(&corrupted));
        let far = compare(&base, &from_sample(&unrelated));
        assert!(near.similarity > far.similarity);
    }
}
