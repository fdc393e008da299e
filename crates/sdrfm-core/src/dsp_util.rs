// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Shared DSP building blocks (spec.md §2 "Shared DSP utilities"): FIR
//! filters (real and complex), single-pole IIR deemphasis, a DC blocker, a
//! moving average for telemetry, and a fast `atan2` approximation.
//!
//! Grounded directly on the teacher's `demod/math.rs` (`fast_atan2`) and
//! `demod.rs`/`demod/wfm.rs` (`DcBlocker`, `Deemphasis`, `OnePoleLowPass`).
//! FIR convolution here is sample-by-sample like the teacher's test-only
//! `dsp::filter::FirFilter`, since the filter lengths in this crate's demod
//! chains (band-pass/pilot-cut, tens of taps) don't justify the overlap-save
//! FFT path the teacher reserves for its `BlockFirFilter`.

use num_complex::Complex;

use crate::sample::IqSample;

/// Polynomial `atan2` approximation, accurate to within a few hundredths of
/// a degree and branch-light enough for per-sample use in the discriminator
/// and pilot PLL.
#[inline]
pub fn fast_atan2(y: f32, x: f32) -> f32 {
    if x == 0.0 {
        if y > 0.0 {
            return std::f32::consts::FRAC_PI_2;
        }
        if y < 0.0 {
            return -std::f32::consts::FRAC_PI_2;
        }
        return 0.0;
    }

    #[inline]
    fn fast_atan(z: f32) -> f32 {
        let abs_z = z.abs();
        if abs_z <= 1.0 {
            z * (std::f32::consts::FRAC_PI_4 + 0.273 * (1.0 - abs_z))
        } else {
            let inv = 1.0 / z;
            let base = inv * (std::f32::consts::FRAC_PI_4 + 0.273 * (1.0 - inv.abs()));
            if z > 0.0 {
                std::f32::consts::FRAC_PI_2 - base
            } else {
                -std::f32::consts::FRAC_PI_2 - base
            }
        }
    }

    if x > 0.0 {
        fast_atan(y / x)
    } else if y >= 0.0 {
        fast_atan(y / x) + std::f32::consts::PI
    } else {
        fast_atan(y / x) - std::f32::consts::PI
    }
}

/// Windowed-sinc low-pass FIR coefficient design (Blackman window), used to
/// build the pilot-cut and NBFM/AM band filters.
pub fn windowed_sinc_lowpass(taps: usize, cutoff_hz: f32, sample_rate: f32) -> Vec<f32> {
    assert!(taps % 2 == 1, "FIR length must be odd for a symmetric filter");
    let fc = (cutoff_hz / sample_rate).clamp(1e-6, 0.5 - 1e-6);
    let m = (taps - 1) as f32;
    let mut coeffs = vec![0.0f32; taps];
    let mut sum = 0.0f32;
    for (n, c) in coeffs.iter_mut().enumerate() {
        let k = n as f32 - m / 2.0;
        let sinc = if k == 0.0 {
            2.0 * fc
        } else {
            (2.0 * std::f32::consts::PI * fc * k).sin() / (std::f32::consts::PI * k)
        };
        let w = 0.42 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / m).cos()
            + 0.08 * (4.0 * std::f32::consts::PI * n as f32 / m).cos();
        *c = sinc * w;
        sum += *c;
    }
    if sum.abs() > 1e-12 {
        for c in coeffs.iter_mut() {
            *c /= sum;
        }
    }
    coeffs
}

/// Complex band-pass FIR design passing `[low_hz, high_hz]` (which may
/// straddle or sit entirely to one side of DC), built by designing a real
/// low-pass prototype for the passband width and modulating its taps up to
/// the passband center. Used by the AM-family and NBFM chains (spec.md
/// §4.9 step 2, §4.10) to select symmetric, upper-sideband, lower-sideband,
/// or narrow-FM passbands from the same construction.
pub fn windowed_sinc_bandpass_complex(taps: usize, low_hz: f32, high_hz: f32, sample_rate: f32) -> Vec<Complex<f32>> {
    let width = (high_hz - low_hz).abs().max(1.0);
    let center = (low_hz + high_hz) / 2.0;
    // the lowpass prototype's cutoff is a half-width: a real lowpass with
    // cutoff fc spans [-fc, fc] (width 2*fc), so modulating it up to
    // `center` must start from fc = width / 2 to land on [low_hz, high_hz].
    let prototype = windowed_sinc_lowpass(taps, width / 2.0, sample_rate);
    let m = (taps - 1) as f32 / 2.0;
    prototype
        .iter()
        .enumerate()
        .map(|(n, &c)| {
            let angle = 2.0 * std::f32::consts::PI * center * (n as f32 - m) / sample_rate;
            Complex::new(c, 0.0) * Complex::new(angle.cos(), angle.sin())
        })
        .collect()
}

/// Real-valued, sample-by-sample FIR filter with a ring-buffer history.
#[derive(Debug, Clone)]
pub struct FirFilter {
    taps: Vec<f32>,
    history: Vec<f32>,
    pos: usize,
}

impl FirFilter {
    pub fn new(taps: Vec<f32>) -> Self {
        let len = taps.len();
        Self {
            taps,
            history: vec![0.0; len],
            pos: 0,
        }
    }

    pub fn process(&mut self, x: f32) -> f32 {
        self.history[self.pos] = x;
        let n = self.taps.len();
        let mut acc = 0.0f32;
        for (k, tap) in self.taps.iter().enumerate() {
            let idx = (self.pos + n - k) % n;
            acc += tap * self.history[idx];
        }
        self.pos = (self.pos + 1) % n;
        acc
    }

    pub fn process_block(&mut self, block: &[f32]) -> Vec<f32> {
        block.iter().map(|&x| self.process(x)).collect()
    }

    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|h| *h = 0.0);
        self.pos = 0;
    }
}

/// Complex-valued counterpart of [`FirFilter`], used for the multipath
/// equalizer's fixed-coefficient band limiting and for complex band-pass
/// filters in the AM/NBFM chains.
#[derive(Debug, Clone)]
pub struct ComplexFirFilter {
    taps: Vec<Complex<f32>>,
    history: Vec<IqSample>,
    pos: usize,
}

impl ComplexFirFilter {
    pub fn new(taps: Vec<Complex<f32>>) -> Self {
        let len = taps.len();
        Self {
            taps,
            history: vec![IqSample::new(0.0, 0.0); len],
            pos: 0,
        }
    }

    pub fn process(&mut self, x: IqSample) -> IqSample {
        self.history[self.pos] = x;
        let n = self.taps.len();
        let mut acc = IqSample::new(0.0, 0.0);
        for (k, tap) in self.taps.iter().enumerate() {
            let idx = (self.pos + n - k) % n;
            acc += tap * self.history[idx];
        }
        self.pos = (self.pos + 1) % n;
        acc
    }

    pub fn process_block(&mut self, block: &[IqSample]) -> Vec<IqSample> {
        block.iter().map(|&x| self.process(x)).collect()
    }

    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|h| *h = IqSample::new(0.0, 0.0));
        self.pos = 0;
    }
}

/// Single-pole low-pass deemphasis (spec.md §3, §4.8). Unlike the teacher's
/// `Deemphasis`, `tau_us` is not clamped away from zero: spec.md's
/// round-trip property requires τ=0 to be an exact identity, which only
/// holds if `alpha` is allowed to reach 1.0.
#[derive(Debug, Clone)]
pub struct Deemphasis {
    alpha: f32,
    y: f32,
}

impl Deemphasis {
    pub fn new(sample_rate: f32, tau_us: f32) -> Self {
        let sr = sample_rate.max(1.0);
        let alpha = if tau_us <= 0.0 {
            1.0
        } else {
            1.0 - (-1.0 / (sr * tau_us * 1e-6)).exp()
        };
        Self { alpha, y: 0.0 }
    }

    pub fn process(&mut self, x: f32) -> f32 {
        self.y += self.alpha * (x - self.y);
        self.y
    }

    pub fn process_block(&mut self, block: &[f32]) -> Vec<f32> {
        block.iter().map(|&x| self.process(x)).collect()
    }

    pub fn reset(&mut self) {
        self.y = 0.0;
    }
}

/// Single-pole DC blocker: `y[n] = x[n] - x[n-1] + r*y[n-1]`.
#[derive(Debug, Clone)]
pub struct DcBlocker {
    r: f32,
    x1: f32,
    y1: f32,
}

impl DcBlocker {
    pub fn new(r: f32) -> Self {
        Self {
            r: r.clamp(0.9, 0.9999),
            x1: 0.0,
            y1: 0.0,
        }
    }

    pub fn process(&mut self, x: f32) -> f32 {
        let y = x - self.x1 + self.r * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }

    pub fn process_block(&mut self, block: &[f32]) -> Vec<f32> {
        block.iter().map(|&x| self.process(x)).collect()
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

/// Running moving average over a fixed window, used only for PPM telemetry
/// display (spec.md §9 open question: it is not a control signal anywhere
/// in this crate).
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: Vec<f64>,
    pos: usize,
    filled: usize,
    sum: f64,
}

impl MovingAverage {
    pub fn new(window_len: usize) -> Self {
        Self {
            window: vec![0.0; window_len.max(1)],
            pos: 0,
            filled: 0,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, x: f64) -> f64 {
        let n = self.window.len();
        self.sum -= self.window[self.pos];
        self.window[self.pos] = x;
        self.sum += x;
        self.pos = (self.pos + 1) % n;
        self.filled = (self.filled + 1).min(n);
        self.average()
    }

    pub fn average(&self) -> f64 {
        if self.filled == 0 {
            0.0
        } else {
            self.sum / self.filled as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx_eq(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() < eps, "{a} vs {b}");
    }

    #[test]
    fn fast_atan2_matches_std_atan2_within_tolerance() {
        for &(y, x) in &[
            (1.0_f32, 1.0),
            (1.0, -1.0),
            (-1.0, -1.0),
            (-1.0, 1.0),
            (0.3, 2.0),
            (2.0, 0.3),
        ] {
            assert_approx_eq(fast_atan2(y, x), y.atan2(x), 0.01);
        }
    }

    #[test]
    fn deemphasis_with_zero_tau_is_identity() {
        let mut d = Deemphasis::new(192_000.0, 0.0);
        let input = [0.1f32, -0.4, 0.9, -1.0, 0.0];
        let out = d.process_block(&input);
        assert_eq!(out, input);
    }

    #[test]
    fn deemphasis_settles_toward_a_constant_input() {
        let mut d = Deemphasis::new(192_000.0, 50.0);
        let mut last = 0.0;
        for _ in 0..20_000 {
            last = d.process(1.0);
        }
        assert_approx_eq(last, 1.0, 1e-3);
    }

    #[test]
    fn dc_blocker_removes_a_constant_offset() {
        let mut dc = DcBlocker::new(0.999);
        let mut last = 0.0;
        for _ in 0..5_000 {
            last = dc.process(0.5);
        }
        assert!(last.abs() < 1e-2);
    }

    #[test]
    fn fir_lowpass_attenuates_a_tone_above_cutoff() {
        let sr = 48_000.0f32;
        let coeffs = windowed_sinc_lowpass(63, 1_000.0, sr);
        let mut f = FirFilter::new(coeffs);
        let n = 4_000;
        let passband: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 200.0 * i as f32 / sr).sin())
            .collect();
        let stopband: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 15_000.0 * i as f32 / sr).sin())
            .collect();
        let pass_rms = rms(&f.process_block(&passband)[n / 2..]);
        f.reset();
        let stop_rms = rms(&f.process_block(&stopband)[n / 2..]);
        assert!(stop_rms < pass_rms * 0.1, "pass={pass_rms} stop={stop_rms}");
    }

    #[test]
    fn moving_average_converges_to_a_constant_value() {
        let mut avg = MovingAverage::new(10);
        let mut last = 0.0;
        for _ in 0..50 {
            last = avg.push(3.0);
        }
        assert_approx_eq(last as f32, 3.0, 1e-6);
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn complex_bandpass_passes_a_tone_inside_the_band_and_rejects_one_outside() {
        let sr = 48_000.0f32;
        let taps = windowed_sinc_bandpass_complex(65, 0.0, 3_000.0, sr);
        let mut filt = ComplexFirFilter::new(taps);
        let n = 4_000;
        let in_band: Vec<IqSample> = (0..n)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * 1_500.0 * i as f32 / sr;
                IqSample::new(phase.cos(), phase.sin())
            })
            .collect();
        let out_of_band: Vec<IqSample> = (0..n)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * 10_000.0 * i as f32 / sr;
                IqSample::new(phase.cos(), phase.sin())
            })
            .collect();
        let pass_mag = avg_mag(&filt.process_block(&in_band)[n / 2..]);
        filt.reset();
        let stop_mag = avg_mag(&filt.process_block(&out_of_band)[n / 2..]);
        assert!(stop_mag < pass_mag * 0.1, "pass={pass_mag} stop={stop_mag}");
    }

    fn avg_mag(x: &[IqSample]) -> f32 {
        x.iter().map(|s| s.norm()).sum::<f32>() / x.len() as f32
    }
}
