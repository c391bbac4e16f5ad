//! Single-frequency spectral magnitude
//!
//! The [`ToneFilter`] estimates the magnitude of *one* DFT bin of
//! a block of audio with the Goertzel algorithm. This is much
//! cheaper than a full FFT when only a handful of frequencies are
//! of interest, which is always the case for CW: the operator's
//! tone is a single carrier.
//!
//! Blocks should be windowed with a [`HammingWindow`] before
//! filtering. Without a window, the abrupt edges of each block leak
//! energy from strong tones into every other bin, and a keyed
//! carrier looks like broadband noise to its neighbors.
//!
//! ```ignore
//! let window = HammingWindow::new(80);
//! let filter = ToneFilter::new(700.0, 8000, 80);
//!
//! let mut windowed = vec![0.0f32; 80];
//! window.apply(&block, &mut windowed);
//! let mag = filter.magnitude(&windowed);
//! ```

use nalgebra::DVector;

/// Hamming window taps
///
/// Tapers a block of samples toward zero at both ends. The window
/// is symmetric and has a coherent gain of about `0.54`, so a
/// full-scale sinusoid centered in a DFT bin will have a windowed
/// magnitude of about `0.27`.
#[derive(Clone, Debug, PartialEq)]
pub struct HammingWindow(DVector<f32>);

impl HammingWindow {
    /// Create window for blocks of `len > 0` samples
    pub fn new(len: usize) -> Self {
        assert!(len > 0);
        let denom = usize::max(len - 1, 1) as f32;
        HammingWindow(DVector::from_fn(len, |i, _| {
            0.54f32 - 0.46f32 * f32::cos(2.0f32 * std::f32::consts::PI * i as f32 / denom)
        }))
    }

    /// Window length, in samples
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Apply window
    ///
    /// Multiplies `input` element-wise by the window taps and
    /// writes the result to `output`. If the slices are of
    /// unequal length, the excess is ignored.
    #[inline]
    pub fn apply(&self, input: &[f32], output: &mut [f32]) {
        for ((o, i), w) in output.iter_mut().zip(input.iter()).zip(self.0.iter()) {
            *o = *i * *w;
        }
    }

    /// Window taps as slice
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        self.0.as_slice()
    }
}

/// Goertzel single-bin magnitude estimator
///
/// The requested frequency is rounded to the nearest DFT bin of
/// the block size, so the filter's resolution is
/// `sample_rate / block_size` Hz. The filter has no state of its
/// own: every call to [`magnitude()`](#method.magnitude) is a pure
/// function of the block.
#[derive(Clone, Debug, PartialEq)]
pub struct ToneFilter {
    // requested frequency (Hz)
    frequency: f32,

    // DFT bin index
    bin: u32,

    // bin center frequency (Hz)
    bin_frequency: f32,

    // 2·cos(2πk/N)
    coeff: f32,
}

impl ToneFilter {
    /// Create filter
    ///
    /// Estimates the magnitude at `frequency` Hz, for blocks of
    /// `block_size` samples taken at `sample_rate` Hz. Frequencies
    /// above the Nyquist rate are clamped to it.
    pub fn new(frequency: f32, sample_rate: u32, block_size: usize) -> Self {
        let n = block_size as f32;
        let fs = sample_rate as f32;
        let bin = f32::round(f32::max(frequency, 0.0) * n / fs);
        let bin = f32::min(bin, f32::floor(n / 2.0));
        let coeff = 2.0f32 * f32::cos(2.0f32 * std::f32::consts::PI * bin / n);

        Self {
            frequency,
            bin: bin as u32,
            bin_frequency: bin * fs / n,
            coeff,
        }
    }

    /// Magnitude of the windowed block
    ///
    /// The `windowed` block should already have been tapered
    /// with a [`HammingWindow`]. Returns a non-negative magnitude,
    /// normalized by the block length.
    #[inline]
    pub fn magnitude(&self, windowed: &[f32]) -> f32 {
        goertzel_magnitude(windowed, self.coeff)
    }

    /// Requested frequency (Hz)
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// DFT bin index
    pub fn bin(&self) -> u32 {
        self.bin
    }

    /// Center frequency of the DFT bin (Hz)
    ///
    /// This is the frequency which the filter actually measures.
    pub fn bin_frequency(&self) -> f32 {
        self.bin_frequency
    }

    /// Recurrence coefficient
    pub fn coefficient(&self) -> f32 {
        self.coeff
    }
}

/// Goertzel magnitude of `samples`
///
/// Runs the two-pole Goertzel recurrence with the given
/// `coefficient`, `2·cos(2πk/N)`, and returns the magnitude of
/// bin `k` divided by the number of samples. An empty slice has
/// zero magnitude.
pub fn goertzel_magnitude(samples: &[f32], coefficient: f32) -> f32 {
    if samples.is_empty() {
        return 0.0f32;
    }

    let mut s1 = 0.0f32;
    let mut s2 = 0.0f32;
    for &x in samples {
        let s0 = x + coefficient * s1 - s2;
        s2 = s1;
        s1 = s0;
    }

    let power = s1 * s1 + s2 * s2 - coefficient * s1 * s2;
    f32::sqrt(f32::max(power, 0.0f32)) / samples.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    fn tone(freq: f32, fs: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * f32::sin(2.0f32 * std::f32::consts::PI * freq * i as f32 / fs as f32)
            })
            .collect()
    }

    #[test]
    fn test_hamming_window() {
        let window = HammingWindow::new(81);
        assert_eq!(81, window.len());
        assert_approx_eq!(0.08f32, window.as_slice()[0]);
        assert_approx_eq!(0.08f32, window.as_slice()[80]);
        assert_approx_eq!(1.0f32, window.as_slice()[40]);
        for i in 0..40 {
            assert_approx_eq!(window.as_slice()[i], window.as_slice()[80 - i]);
        }

        let mut out = [0.0f32; 81];
        window.apply(&[2.0f32; 81], &mut out);
        assert_approx_eq!(2.0f32, out[40]);
    }

    #[test]
    fn test_bin_rounding() {
        // 100 Hz bins
        let filt = ToneFilter::new(700.0, 8000, 80);
        assert_eq!(7, filt.bin());
        assert_approx_eq!(700.0f32, filt.bin_frequency());

        let filt = ToneFilter::new(730.0, 8000, 80);
        assert_eq!(7, filt.bin());
        assert_approx_eq!(730.0f32, filt.frequency());

        // clamped to nyquist
        let filt = ToneFilter::new(9000.0, 8000, 80);
        assert_eq!(40, filt.bin());
    }

    #[test]
    fn test_goertzel_unwindowed() {
        // a bin-centered sinusoid of amplitude A has magnitude A/2
        let sig = tone(700.0, 8000, 80, 0.8);
        let filt = ToneFilter::new(700.0, 8000, 80);
        assert_approx_eq!(0.4f32, filt.magnitude(&sig), 1.0e-3);

        // orthogonal bins see nothing
        let filt = ToneFilter::new(1000.0, 8000, 80);
        assert!(filt.magnitude(&sig) < 1.0e-3);

        assert_eq!(0.0f32, goertzel_magnitude(&[], 1.0));
        assert_eq!(0.0f32, filt.magnitude(&[0.0f32; 80]));
    }

    #[test]
    fn test_goertzel_windowed() {
        let window = HammingWindow::new(80);
        let mut windowed = vec![0.0f32; 80];

        let sig = tone(700.0, 8000, 80, 1.0);
        window.apply(&sig, &mut windowed);

        let on_bin = ToneFilter::new(700.0, 8000, 80).magnitude(&windowed);
        assert_approx_eq!(0.27f32, on_bin, 0.01);

        // leakage falls off quickly away from the tone
        let near = ToneFilter::new(800.0, 8000, 80).magnitude(&windowed);
        let far = ToneFilter::new(1000.0, 8000, 80).magnitude(&windowed);
        assert!(near < 0.5 * on_bin);
        assert!(far < 0.02 * on_bin);
    }
}
