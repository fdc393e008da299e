// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wideband FM demodulation and stereo separation (spec.md §4.6-§4.8).
//!
//! Grounded on the teacher's `demod::wfm::WfmStereoDecoder`: the same
//! mono/stereo dual-path shape (one MPX feeding a sum chain and a
//! pilot-synchronous difference chain, each independently deemphasized,
//! resampled, and DC-blocked) built from this crate's own
//! [`crate::discriminator`], [`crate::pilot`], [`crate::resample`], and
//! [`crate::dsp_util`] blocks rather than the teacher's inline biquads,
//! since spec.md's pilot PLL and multipath stages replace the teacher's
//! simpler NCO-based tracking. The device-rate-to-demod-rate IF resample
//! stage (spec.md §4.3) mirrors the fixed-target convention [`crate::am`]
//! and [`crate::nbfm`] already use for their own internal rates.

use crate::agc::IfAgc;
use crate::discriminator::PhaseDiscriminator;
use crate::dsp_util::{windowed_sinc_lowpass, DcBlocker, Deemphasis, FirFilter};
use crate::multipath::MultipathEqualizer;
use crate::pilot::{PilotPll, PilotPllConfig, PpsEvent};
use crate::resample::ComplexResampler;
use crate::sample::IqSample;

/// Fixed demodulator-native rate the IF resampler (spec.md §4.3) converts
/// the device's IF rate to, ahead of IF AGC/multipath/discriminator — the
/// same fixed-target convention as [`crate::am::AmDecoder`] and
/// [`crate::nbfm::NbfmDecoder`]'s `INTERNAL_RATE_HZ`.
const FM_TARGET_RATE_HZ: f64 = 384_000.0;
const IF_RESAMPLE_TAPS: usize = 32;
const IF_RESAMPLE_PHASES: usize = 64;

/// spec.md §9 open question: the original source forces `stereo_detected`
/// to `true` regardless of pilot lock. We expose both behaviors rather than
/// silently picking one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StereoDetectPolicy {
    /// Use the pilot PLL's own lock predicate (the behavior a reader would
    /// expect from the state machine in spec.md §4.7).
    FollowPilotLock,
    /// Always report stereo as detected, matching the original source's
    /// literal (possibly unintentional) behavior.
    AlwaysDetected,
}

#[derive(Debug, Clone)]
pub struct FmDecoderConfig {
    /// Device IF sample rate, converted to [`FM_TARGET_RATE_HZ`] by the
    /// internal IF resampler (spec.md §4.3) ahead of every other stage.
    pub if_rate_hz: f64,
    pub pcm_rate_hz: f64,
    pub freq_dev_hz: f32,
    pub deemphasis_tau_us: f32,
    pub pilot_shift: bool,
    pub pilot_bandwidth_hz: f32,
    pub pilot_minsignal: f32,
    pub multipath_stages: Option<usize>,
    pub stereo_detect_policy: StereoDetectPolicy,
    pub if_agc_target: f32,
    pub if_agc_rate: f32,
}

impl Default for FmDecoderConfig {
    fn default() -> Self {
        Self {
            if_rate_hz: 384_000.0,
            pcm_rate_hz: 48_000.0,
            freq_dev_hz: 75_000.0,
            deemphasis_tau_us: 75.0,
            pilot_shift: false,
            pilot_bandwidth_hz: 50.0,
            pilot_minsignal: 0.04,
            multipath_stages: None,
            stereo_detect_policy: StereoDetectPolicy::FollowPilotLock,
            if_agc_target: 1.0,
            if_agc_rate: 0.001,
        }
    }
}

/// A stereo-separated, PCM-rate audio block: interleaved `(left, right)`
/// pairs per spec.md §4.8's output policy.
#[derive(Debug, Clone, Default)]
pub struct FmAudioBlock {
    pub interleaved: Vec<f32>,
    pub stereo_detected: bool,
    pub pilot_locked: bool,
    pub pps_events: Vec<PpsEvent>,
}

pub struct FmDecoder {
    if_resample: ComplexResampler,
    if_agc: IfAgc,
    multipath: Option<MultipathEqualizer>,
    discriminator: PhaseDiscriminator,
    pilot: PilotPll,
    pilot_shift: bool,
    stereo_detect_policy: StereoDetectPolicy,

    mono_deemph: Deemphasis,
    mono_resample: crate::resample::Resampler,
    mono_pilot_cut: FirFilter,
    mono_dc: DcBlocker,

    stereo_deemph: Deemphasis,
    stereo_resample: crate::resample::Resampler,
    stereo_pilot_cut: FirFilter,
    stereo_dc: DcBlocker,
}

const PILOT_CUT_TAPS: usize = 63;
const PILOT_CUT_HZ: f32 = 15_000.0;
const STEREO_BOOST: f32 = 1.017;

impl FmDecoder {
    pub fn new(config: FmDecoderConfig) -> Self {
        let pilot_cut_coeffs = windowed_sinc_lowpass(PILOT_CUT_TAPS, PILOT_CUT_HZ, config.pcm_rate_hz as f32);

        Self {
            if_resample: ComplexResampler::new(config.if_rate_hz, FM_TARGET_RATE_HZ, IF_RESAMPLE_TAPS, IF_RESAMPLE_PHASES),
            if_agc: IfAgc::new(config.if_agc_target, config.if_agc_rate),
            multipath: config.multipath_stages.map(|n| MultipathEqualizer::new(n, 0.01, 0.01)),
            discriminator: PhaseDiscriminator::new(FM_TARGET_RATE_HZ as f32, config.freq_dev_hz),
            pilot: PilotPll::new(PilotPllConfig {
                sample_rate_hz: FM_TARGET_RATE_HZ as f32,
                pilot_frequency_hz: 19_000.0,
                bandwidth_hz: config.pilot_bandwidth_hz,
                minsignal: config.pilot_minsignal,
                pilot_shift: config.pilot_shift,
            }),
            pilot_shift: config.pilot_shift,
            stereo_detect_policy: config.stereo_detect_policy,

            mono_deemph: Deemphasis::new(FM_TARGET_RATE_HZ as f32, config.deemphasis_tau_us),
            mono_resample: crate::resample::Resampler::new(FM_TARGET_RATE_HZ, config.pcm_rate_hz, 32, 64),
            mono_pilot_cut: FirFilter::new(pilot_cut_coeffs.clone()),
            mono_dc: DcBlocker::new(0.999),

            stereo_deemph: Deemphasis::new(FM_TARGET_RATE_HZ as f32, config.deemphasis_tau_us),
            stereo_resample: crate::resample::Resampler::new(FM_TARGET_RATE_HZ, config.pcm_rate_hz, 32, 64),
            stereo_pilot_cut: FirFilter::new(pilot_cut_coeffs),
            stereo_dc: DcBlocker::new(0.999),
        }
    }

    pub fn pilot_locked(&self) -> bool {
        self.pilot.locked()
    }

    /// Run one IQ block through the full FM chain (spec.md §4.4-§4.8),
    /// producing one interleaved stereo (or mono-duplicated) PCM block.
    pub fn process_block(&mut self, iq: &[IqSample]) -> FmAudioBlock {
        let at_rate = self.if_resample.process_block(iq);
        let agcd = self.if_agc.process_block(&at_rate);
        let equalized = match &mut self.multipath {
            Some(eq) => eq.process_block(&agcd),
            None => agcd,
        };

        let mpx = self.discriminator.process_block(&equalized);
        let pilot_out = self.pilot.process_block(&mpx);

        let stereo_detected = match self.stereo_detect_policy {
            StereoDetectPolicy::FollowPilotLock => pilot_out.locked,
            StereoDetectPolicy::AlwaysDetected => true,
        };

        let mut diff_raw: Vec<f32> = mpx
            .iter()
            .zip(pilot_out.subcarrier.iter())
            .map(|(&x, &sub)| x * 2.0 * sub)
            .collect();
        if !self.pilot_shift {
            diff_raw = self.stereo_deemph.process_block(&diff_raw);
        }

        let mono_audio = {
            let deemph = self.mono_deemph.process_block(&mpx);
            let resampled = self.mono_resample.process_block(&deemph);
            let cut = self.mono_pilot_cut.process_block(&resampled);
            self.mono_dc.process_block(&cut)
        };

        let stereo_audio = {
            let resampled = self.stereo_resample.process_block(&diff_raw);
            let cut = self.stereo_pilot_cut.process_block(&resampled);
            let dc_blocked = self.stereo_dc.process_block(&cut);
            dc_blocked.into_iter().map(|s| s * STEREO_BOOST).collect::<Vec<f32>>()
        };

        let n = mono_audio.len().min(stereo_audio.len());
        let mut interleaved = Vec::with_capacity(n * 2);
        for i in 0..n {
            let m = mono_audio[i];
            let s = stereo_audio[i];
            let (l, r) = if stereo_detected && !self.pilot_shift {
                (m + s, m - s)
            } else if stereo_detected && self.pilot_shift {
                (s, s)
            } else if !self.pilot_shift {
                (m, m)
            } else {
                (0.0, 0.0)
            };
            interleaved.push(l);
            interleaved.push(r);
        }

        FmAudioBlock {
            interleaved,
            stereo_detected,
            pilot_locked: pilot_out.locked,
            pps_events: pilot_out.pps_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth_mono_fm(sr: f64, dev: f32, audio_freq: f32, n: usize) -> Vec<IqSample> {
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
    fn silence_in_yields_silence_out_after_warmup() {
        let mut dec = FmDecoder::new(FmDecoderConfig {
            multipath_stages: Some(5),
            ..Default::default()
        });
        let silence = vec![IqSample::new(0.0, 0.0); 4096];
        let mut last = FmAudioBlock::default();
        for _ in 0..120 {
            last = dec.process_block(&silence);
        }
        assert!(!last.interleaved.is_empty());
        for &s in &last.interleaved {
            assert!(s.abs() < 1e-3, "s={s}");
        }
        assert!(!dec.pilot_locked());
        assert!(last.pps_events.is_empty());
    }

    #[test]
    fn mono_tone_is_not_reported_as_stereo_without_a_pilot() {
        let mut dec = FmDecoder::new(FmDecoderConfig {
            stereo_detect_policy: StereoDetectPolicy::FollowPilotLock,
            ..Default::default()
        });
        let iq = synth_mono_fm(384_000.0, 75_000.0, 1_000.0, 40_000);
        let mut last = FmAudioBlock::default();
        for block in iq.chunks(4096) {
            last = dec.process_block(block);
        }
        assert!(!last.stereo_detected);
        let rms = (last.interleaved.iter().map(|x| x * x).sum::<f32>() / last.interleaved.len() as f32).sqrt();
        assert!(rms > 0.05, "rms={rms}");
    }

    #[test]
    fn mono_and_stereo_paths_emit_equal_length_blocks() {
        let mut dec = FmDecoder::new(FmDecoderConfig::default());
        let iq = synth_mono_fm(384_000.0, 75_000.0, 1_000.0, 4096);
        let block = dec.process_block(&iq);
        assert_eq!(block.interleaved.len() % 2, 0);
    }

    #[test]
    fn a_device_if_rate_off_the_fm_target_rate_still_recovers_the_tone() {
        // spec.md §4.3: the IF resampler must tolerate non-integer ratios
        // between the device's IF rate and the demodulator's native rate.
        let device_if_rate_hz = 912_000.0;
        let mut dec = FmDecoder::new(FmDecoderConfig {
            if_rate_hz: device_if_rate_hz,
            ..Default::default()
        });
        let iq = synth_mono_fm(device_if_rate_hz, 75_000.0, 1_000.0, 120_000);
        let mut last = FmAudioBlock::default();
        for block in iq.chunks(8192) {
            last = dec.process_block(block);
        }
        assert!(!last.interleaved.is_empty());
        let rms = (last.interleaved.iter().map(|x| x * x).sum::<f32>() / last.interleaved.len() as f32).sqrt();
        assert!(rms > 0.02, "rms={rms}");
    }
}
