// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Real-time signal-processing core of an SDR FM/AM receiver: the
//! concurrent staging that moves IQ blocks from a producer to a consumer,
//! and the DSP blocks that turn them into audio (IF conditioning, FM/AM/NBFM
//! demodulation, pilot-locked stereo separation, resampling, deemphasis).
//!
//! This crate has no knowledge of tuner hardware or audio sinks; it is
//! driven through the [`pipeline`] traits by a host binary (see the sibling
//! `sdrfm-cli` crate).

pub mod agc;
pub mod am;
pub mod discriminator;
pub mod dsp_util;
pub mod error;
pub mod fm;
pub mod multipath;
pub mod nbfm;
pub mod pilot;
pub mod pipeline;
pub mod queue;
pub mod resample;
pub mod sample;
pub mod shift;

pub use error::{CoreError, ErrorKind};
pub use sample::{IqBlock, IqSample, Sample, SampleBlock};
