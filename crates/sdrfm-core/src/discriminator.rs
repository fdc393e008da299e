// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Phase discriminator (spec.md §4.6).
//!
//! Grounded on the teacher's `demod::math::demod_fm_with_prev`, which takes
//! `arg(s[n] * conj(s[n-1]))` via [`crate::dsp_util::fast_atan2`] and scales
//! by `1/π`. The teacher's scale is a fixed `1/π` normalization tuned for
//! its own deviation convention; spec.md instead asks for a gain that maps
//! a `freq_dev` deviation to full scale, so [`PhaseDiscriminator`]
//! generalizes the teacher's constant into `1/max_phase`.

use crate::dsp_util::fast_atan2;
use crate::sample::IqSample;

/// Converts a complex IF stream into instantaneous frequency, normalized so
/// that a deviation of `freq_dev_hz` at `sample_rate_hz` maps to ±1.0.
#[derive(Debug, Clone)]
pub struct PhaseDiscriminator {
    gain: f32,
    prev: Option<IqSample>,
}

impl PhaseDiscriminator {
    pub fn new(sample_rate_hz: f32, freq_dev_hz: f32) -> Self {
        let max_phase = 2.0 * std::f32::consts::PI * freq_dev_hz / sample_rate_hz;
        Self {
            gain: 1.0 / max_phase,
            prev: None,
        }
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }

    pub fn process_block(&mut self, samples: &[IqSample]) -> Vec<f32> {
        if samples.is_empty() {
            return Vec::new();
        }
        let mut output = Vec::with_capacity(samples.len());
        let mut prev = self.prev;

        for &s in samples {
            let freq = match prev {
                Some(p) => {
                    let product = s * p.conj();
                    fast_atan2(product.im, product.re) * self.gain
                }
                None => 0.0,
            };
            output.push(freq);
            prev = Some(s);
        }

        self.prev = prev;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx_eq(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() < eps, "{a} vs {b}");
    }

    fn fm_tone(sample_rate: f32, freq_dev: f32, audio_freq: f32, carrier_phase0: f32, n: usize) -> Vec<IqSample> {
        let mut phase = carrier_phase0;
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let modulator = (2.0 * std::f32::consts::PI * audio_freq * i as f32 / sample_rate).sin();
            phase += 2.0 * std::f32::consts::PI * freq_dev * modulator / sample_rate;
            out.push(IqSample::new(phase.cos(), phase.sin()));
        }
        out
    }

    #[test]
    fn recovers_a_modulating_tone_at_unit_amplitude() {
        let sr = 384_000.0;
        let dev = 75_000.0;
        let audio_freq = 1_000.0;
        let samples = fm_tone(sr, dev, audio_freq, 0.0, 8_000);
        let mut disc = PhaseDiscriminator::new(sr, dev);
        let out = disc.process_block(&samples);
        let peak = out[1000..].iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
        assert_approx_eq(peak, 1.0, 0.15);
    }

    #[test]
    fn zero_deviation_carrier_produces_near_zero_output() {
        let sr = 384_000.0;
        let samples = fm_tone(sr, 75_000.0, 1_000.0, 0.0, 500);
        let silent = vec![IqSample::new(1.0, 0.0); samples.len()];
        let mut disc = PhaseDiscriminator::new(sr, 75_000.0);
        let out = disc.process_block(&silent);
        for &x in &out[1..] {
            assert!(x.abs() < 1e-4);
        }
    }

    #[test]
    fn state_carries_across_block_boundaries() {
        let sr = 384_000.0;
        let samples = fm_tone(sr, 75_000.0, 1_000.0, 0.3, 2_000);

        let mut whole_disc = PhaseDiscriminator::new(sr, 75_000.0);
        let whole = whole_disc.process_block(&samples);

        let mut split_disc = PhaseDiscriminator::new(sr, 75_000.0);
        let mut split = split_disc.process_block(&samples[..700]);
        split.extend(split_disc.process_block(&samples[700..]));

        for (a, b) in whole.iter().zip(split.iter()) {
            assert_approx_eq(*a, *b, 1e-6);
        }
    }
}
