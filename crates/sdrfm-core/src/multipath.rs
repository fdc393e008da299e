// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Adaptive multipath equalizer (spec.md §4.5).
//!
//! No teacher file implements an adaptive equalizer directly; this is
//! grounded on the teacher's envelope-follower idiom in `demod::SoftAgc`
//! (a smoothed reference level driving a correction) generalized from a
//! scalar gain to a complex tap vector, updated by a normalized-LMS step —
//! the same per-sample ring-buffer-and-coefficient-vector shape as the
//! teacher's `dsp::filter::FirFilter`, but with taps adapted instead of
//! fixed.

use num_complex::Complex;

use crate::sample::IqSample;

const WARMUP_BLOCKS: u64 = 100;
const RESET_THRESHOLD: f32 = 0.01;
const NLMS_EPS: f32 = 1e-6;

/// Complex adaptive FIR with `N` taps (`N` odd, center tap starts at
/// `1 + 0i`). Drives its own correction toward a smoothed reference
/// envelope and self-resets on numerical trouble (spec.md §3, §4.5).
#[derive(Debug, Clone)]
pub struct MultipathEqualizer {
    taps: Vec<Complex<f32>>,
    history: Vec<IqSample>,
    pos: usize,
    mu: f32,
    ref_alpha: f32,
    ref_level: f32,
    last_error: f32,
    blocks_processed: u64,
}

impl MultipathEqualizer {
    /// `stages` is the tap count (`multipath_stages`, must be odd).
    /// `mu` is the NLMS step size; `ref_alpha` is the one-pole smoothing
    /// coefficient for the reference envelope follower.
    pub fn new(stages: usize, mu: f32, ref_alpha: f32) -> Self {
        assert!(stages % 2 == 1, "multipath_stages must be odd");
        let mut taps = vec![Complex::new(0.0_f32, 0.0); stages];
        taps[stages / 2] = Complex::new(1.0, 0.0);
        Self {
            taps,
            history: vec![IqSample::new(0.0, 0.0); stages],
            pos: 0,
            mu,
            ref_alpha: ref_alpha.clamp(1e-6, 1.0),
            ref_level: 0.0,
            last_error: 0.0,
            blocks_processed: 0,
        }
    }

    pub fn coefficients(&self) -> &[Complex<f32>] {
        &self.taps
    }

    pub fn current_error(&self) -> f32 {
        self.last_error
    }

    pub fn current_reference_level(&self) -> f32 {
        self.ref_level
    }

    fn reset_taps(&mut self) {
        let n = self.taps.len();
        for t in self.taps.iter_mut() {
            *t = Complex::new(0.0, 0.0);
        }
        self.taps[n / 2] = Complex::new(1.0, 0.0);
    }

    fn convolve(&self) -> IqSample {
        let n = self.taps.len();
        let mut acc = IqSample::new(0.0, 0.0);
        for (k, tap) in self.taps.iter().enumerate() {
            let idx = (self.pos + n - k) % n;
            acc += tap * self.history[idx];
        }
        acc
    }

    /// Equalize one block of AGC'd IF samples. During the first
    /// [`WARMUP_BLOCKS`] blocks after construction the equalizer bypasses
    /// entirely (spec.md §4.5 "startup grace").
    ///
    /// If the adaptation diverges partway through a block (non-finite error
    /// or a vanishing reference envelope), spec.md §4.5 falls back "that
    /// block's output" to the AGC'd input wholesale — not just the samples
    /// from the divergent one onward — so a diverging block is discarded in
    /// full and replaced with `input.to_vec()` once diverged is detected.
    pub fn process_block(&mut self, input: &[IqSample]) -> Vec<IqSample> {
        self.blocks_processed += 1;
        if self.blocks_processed <= WARMUP_BLOCKS {
            return input.to_vec();
        }

        let n = self.taps.len();
        let mut output = Vec::with_capacity(input.len());
        let mut diverged = false;

        for &x in input {
            self.history[self.pos] = x;

            if diverged {
                self.pos = (self.pos + 1) % n;
                continue;
            }

            let level = x.norm();
            self.ref_level += self.ref_alpha * (level - self.ref_level);

            if !self.ref_level.is_finite() || self.ref_level.abs() < RESET_THRESHOLD {
                diverged = true;
                self.pos = (self.pos + 1) % n;
                continue;
            }

            let y = self.convolve();
            let mag_y = y.norm();
            let desired = if mag_y > 1e-12 {
                y * (self.ref_level / mag_y)
            } else {
                Complex::new(self.ref_level, 0.0)
            };
            let error = desired - y;
            self.last_error = error.norm();

            if !self.last_error.is_finite() {
                diverged = true;
                self.pos = (self.pos + 1) % n;
                continue;
            }

            let mu_n = self.mu / (self.ref_level * self.ref_level + NLMS_EPS);
            for (k, tap) in self.taps.iter_mut().enumerate() {
                let idx = (self.pos + n - k) % n;
                *tap += mu_n * self.history[idx].conj() * error;
            }

            output.push(y);
            self.pos = (self.pos + 1) % n;
        }

        if diverged {
            self.reset_taps();
            input.to_vec()
        } else {
            output
        }
    }
}
