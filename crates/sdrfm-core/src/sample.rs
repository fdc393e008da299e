// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Sample types (spec.md §3 DATA MODEL).
//!
//! The DSP interior runs in `f32` throughout — matching the teacher's
//! `trx-backend-soapysdr` demodulators, which use `Complex<f32>`/`f32`
//! everywhere for SIMD-friendliness. The audio-facing boundary (the audio
//! queue and everything past it) widens to `f64`; [`widen`]/[`narrow`]
//! mark that single documented conversion point.

use num_complex::Complex;

/// Complex-valued baseband sample (in-phase, quadrature), 32-bit components.
pub type IqSample = Complex<f32>;

/// Audio-side scalar sample, 64-bit.
pub type Sample = f64;

/// One tick of IQ work.
pub type IqBlock = Vec<IqSample>;

/// One tick of audio work.
pub type SampleBlock = Vec<Sample>;

/// Widen a `f32` DSP-interior audio sample to the `f64` audio-queue boundary.
#[inline]
pub fn widen(x: f32) -> Sample {
    x as f64
}

/// Narrow a `f64` audio-queue sample back to `f32` for DSP-interior reuse.
#[inline]
pub fn narrow(x: Sample) -> f32 {
    x as f32
}

/// Widen a whole block in one documented boundary crossing.
pub fn widen_block(block: &[f32]) -> SampleBlock {
    block.iter().copied().map(widen).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_narrow_round_trip_is_lossless_for_f32_representable_values() {
        for &x in &[0.0_f32, 1.0, -1.0, 0.5, -0.333_333_3] {
            assert_eq!(narrow(widen(x)), x);
        }
    }
}
