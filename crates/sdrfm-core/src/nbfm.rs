// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Narrow-band FM demodulation (spec.md §4.10).
//!
//! Grounded on the teacher's `Demodulator::Fm` path (the same quadrature
//! discriminator as wideband FM, just with a narrower upstream filter and a
//! smaller deviation), reusing this crate's [`crate::discriminator`] and
//! [`crate::dsp_util::windowed_sinc_bandpass_complex`] rather than the
//! teacher's fixed biquad band-pass since the filter width here is a
//! runtime selection (spec.md §6 CLI surface: `wide|default|medium|narrow`).

use crate::agc::IfAgc;
use crate::discriminator::PhaseDiscriminator;
use crate::dsp_util::{windowed_sinc_bandpass_complex, ComplexFirFilter};
use crate::resample::{ComplexResampler, Resampler};
use crate::sample::IqSample;

const INTERNAL_RATE_HZ: f64 = 48_000.0;
const BANDPASS_TAPS: usize = 127;

/// Selectable NBFM channel half-bandwidths (spec.md §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NbfmFilterWidth {
    Narrow625,
    Narrow8,
    Narrow10,
    Narrow20,
}

impl NbfmFilterWidth {
    fn half_bandwidth_hz(self) -> f32 {
        match self {
            NbfmFilterWidth::Narrow625 => 6_250.0,
            NbfmFilterWidth::Narrow8 => 8_000.0,
            NbfmFilterWidth::Narrow10 => 10_000.0,
            NbfmFilterWidth::Narrow20 => 20_000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NbfmDecoderConfig {
    pub if_rate_hz: f64,
    pub pcm_rate_hz: f64,
    pub filter_width: NbfmFilterWidth,
    pub freq_dev_hz: f32,
}

impl Default for NbfmDecoderConfig {
    fn default() -> Self {
        Self {
            if_rate_hz: INTERNAL_RATE_HZ,
            pcm_rate_hz: INTERNAL_RATE_HZ,
            filter_width: NbfmFilterWidth::Narrow8,
            freq_dev_hz: 5_000.0,
        }
    }
}

pub struct NbfmDecoder {
    if_agc: IfAgc,
    to_internal_rate: ComplexResampler,
    bandpass: ComplexFirFilter,
    discriminator: PhaseDiscriminator,
    audio_resample: Resampler,
}

impl NbfmDecoder {
    pub fn new(config: NbfmDecoderConfig) -> Self {
        let half_bw = config.filter_width.half_bandwidth_hz();
        let taps = windowed_sinc_bandpass_complex(BANDPASS_TAPS, -half_bw, half_bw, INTERNAL_RATE_HZ as f32);
        Self {
            if_agc: IfAgc::new(1.0, 0.001),
            to_internal_rate: ComplexResampler::new(config.if_rate_hz, INTERNAL_RATE_HZ, 32, 64),
            bandpass: ComplexFirFilter::new(taps),
            discriminator: PhaseDiscriminator::new(INTERNAL_RATE_HZ as f32, config.freq_dev_hz),
            audio_resample: Resampler::new(INTERNAL_RATE_HZ, config.pcm_rate_hz, 32, 64),
        }
    }

    pub fn process_block(&mut self, iq: &[IqSample]) -> Vec<f32> {
        let at_rate = self.to_internal_rate.process_block(iq);
        let agcd = self.if_agc.process_block(&at_rate);
        let filtered = self.bandpass.process_block(&agcd);
        let mpx = self.discriminator.process_block(&filtered);
        self.audio_resample.process_block(&mpx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nbfm_tone(sr: f64, dev: f32, audio_freq: f32, n: usize) -> Vec<IqSample> {
        let sr = sr as f32;
        let mut phase = 0.0f32;
        (0..n)
            .map(|i| {
                let modulator = (2.0 * std::f32::consts::PI * audio_freq * i as f32 / sr).sin();
                phase += 2.0 * std::f32::consts::PI * dev * modulator / sr;
                IqSample::new(phase.cos(), phase.sin())
            })
            .collect()
    }

    #[test]
    fn recovers_a_tone_within_the_narrow_deviation() {
        let mut dec = NbfmDecoder::new(NbfmDecoderConfig {
            filter_width: NbfmFilterWidth::Narrow10,
            freq_dev_hz: 5_000.0,
            ..Default::default()
        });
        let iq = nbfm_tone(48_000.0, 3_000.0, 1_000.0, 48_000);
        let mut last = Vec::new();
        for block in iq.chunks(2048) {
            last = dec.process_block(block);
        }
        let rms = (last.iter().map(|x| x * x).sum::<f32>() / last.len() as f32).sqrt();
        assert!(rms > 0.05, "rms={rms}");
    }

    #[test]
    fn wider_filter_selections_still_produce_finite_output() {
        for width in [
            NbfmFilterWidth::Narrow625,
            NbfmFilterWidth::Narrow8,
            NbfmFilterWidth::Narrow10,
            NbfmFilterWidth::Narrow20,
        ] {
            let mut dec = NbfmDecoder::new(NbfmDecoderConfig {
                filter_width: width,
                ..Default::default()
            });
            let iq = nbfm_tone(48_000.0, 2_000.0, 800.0, 4_096);
            let out = dec.process_block(&iq);
            assert!(out.iter().all(|x| x.is_finite()));
        }
    }
}
