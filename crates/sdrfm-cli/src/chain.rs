// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Adapts the per-mode decoders in `sdrfm-core` to the
//! [`sdrfm_core::pipeline::DecodeChain`] trait the worker thread drives,
//! widening their `f32`/interleaved-stereo outputs to the pipeline's
//! `SampleBlock` (`Vec<f64>`), writing FM's PPS events directly from the
//! worker thread, and publishing pilot-lock state back to the worker
//! through `DecodeChain::pilot_locked` (spec.md §5: the worker owns
//! `Metrics`, so no queue or cross-thread synchronization is needed here).

use sdrfm_core::am::AmDecoder;
use sdrfm_core::fm::FmDecoder;
use sdrfm_core::nbfm::NbfmDecoder;
use sdrfm_core::pipeline::DecodeChain;
use sdrfm_core::sample::widen_block;
use sdrfm_core::{IqSample, SampleBlock};

use crate::pps::PpsWriter;

/// RMS level of an IQ block in dBFS, `-f32::INFINITY` for an exactly silent
/// block. Used by every chain to implement `--squelch-db` (spec.md §6):
/// the spec lists squelch as part of the CLI contract without prescribing
/// a detector, so this mutes audio using the same IF-level measurement the
/// pipeline already reports through [`sdrfm_core::pipeline::Metrics`].
fn iq_level_db(iq: &[IqSample]) -> f32 {
    if iq.is_empty() {
        return f32::NEG_INFINITY;
    }
    let mean_sq: f32 = iq.iter().map(|s| s.norm_sqr()).sum::<f32>() / iq.len() as f32;
    10.0 * mean_sq.max(f32::MIN_POSITIVE).log10()
}

/// FM mode: interleaved stereo (or doubled mono) at `f32`, plus PPS events
/// written directly to `pps_writer` from the worker thread, plus pilot
/// lock state published through [`DecodeChain::pilot_locked`] for
/// [`sdrfm_core::pipeline::Metrics`].
pub struct FmChain {
    decoder: FmDecoder,
    pps_writer: Option<PpsWriter>,
    pilot_locked: bool,
    sample_index: u64,
    squelch_db: f32,
}

impl FmChain {
    pub fn new(decoder: FmDecoder, pps_writer: Option<PpsWriter>, squelch_db: f32) -> Self {
        Self { decoder, pps_writer, pilot_locked: false, sample_index: 0, squelch_db }
    }
}

impl DecodeChain for FmChain {
    fn process(&mut self, iq: &[IqSample]) -> SampleBlock {
        let below_squelch = iq_level_db(iq) < self.squelch_db;
        let block = self.decoder.process_block(iq);
        self.pilot_locked = block.pilot_locked;

        if let Some(writer) = self.pps_writer.as_mut() {
            for event in &block.pps_events {
                if let Err(e) = writer.write_fm_event(event.pps_index, self.sample_index + event.sample_index) {
                    tracing::warn!(error = %e, "failed to write PPS event");
                }
            }
        }
        self.sample_index += iq.len() as u64;

        if below_squelch {
            vec![0.0; block.interleaved.len()]
        } else {
            widen_block(&block.interleaved)
        }
    }

    fn pilot_locked(&self) -> Option<bool> {
        Some(self.pilot_locked)
    }
}

/// AM/DSB/USB/LSB/CW mode: mono `f32` audio, optionally accompanied by a
/// periodic (non-pilot-derived) PPS heartbeat per spec.md §6.
pub struct AmChain {
    decoder: AmDecoder,
    pps_writer: Option<PpsWriter>,
    block_index: u64,
    squelch_db: f32,
}

impl AmChain {
    pub fn new(decoder: AmDecoder, pps_writer: Option<PpsWriter>, squelch_db: f32) -> Self {
        Self { decoder, pps_writer, block_index: 0, squelch_db }
    }
}

impl DecodeChain for AmChain {
    fn process(&mut self, iq: &[IqSample]) -> SampleBlock {
        let below_squelch = iq_level_db(iq) < self.squelch_db;
        let audio = self.decoder.process_block(iq);
        if let Some(writer) = self.pps_writer.as_mut() {
            if let Err(e) = writer.write_periodic_event(self.block_index) {
                tracing::warn!(error = %e, "failed to write PPS heartbeat");
            }
        }
        self.block_index += 1;
        if below_squelch {
            vec![0.0; audio.len()]
        } else {
            widen_block(&audio)
        }
    }
}

/// Narrowband FM mode: mono `f32` audio with the same periodic heartbeat
/// as the AM family (no pilot to derive timing from).
pub struct NbfmChain {
    decoder: NbfmDecoder,
    pps_writer: Option<PpsWriter>,
    block_index: u64,
    squelch_db: f32,
}

impl NbfmChain {
    pub fn new(decoder: NbfmDecoder, pps_writer: Option<PpsWriter>, squelch_db: f32) -> Self {
        Self { decoder, pps_writer, block_index: 0, squelch_db }
    }
}

impl DecodeChain for NbfmChain {
    fn process(&mut self, iq: &[IqSample]) -> SampleBlock {
        let below_squelch = iq_level_db(iq) < self.squelch_db;
        let audio = self.decoder.process_block(iq);
        if let Some(writer) = self.pps_writer.as_mut() {
            if let Err(e) = writer.write_periodic_event(self.block_index) {
                tracing::warn!(error = %e, "failed to write PPS heartbeat");
            }
        }
        self.block_index += 1;
        if below_squelch {
            vec![0.0; audio.len()]
        } else {
            widen_block(&audio)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iq_level_db_reports_negative_infinity_for_silence() {
        assert_eq!(iq_level_db(&[]), f32::NEG_INFINITY);
        let silent = vec![IqSample::new(0.0, 0.0); 16];
        assert!(iq_level_db(&silent) < -300.0);
    }

    #[test]
    fn iq_level_db_reports_zero_for_unit_amplitude_tone() {
        let unit = vec![IqSample::new(1.0, 0.0); 16];
        assert!((iq_level_db(&unit) - 0.0).abs() < 1e-3);
    }
}
