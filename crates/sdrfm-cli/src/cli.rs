// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Command-line surface (spec.md §6 "CLI surface").
//!
//! Grounded on the teacher's `trx-bin::main::Cli`: a `clap::Parser` struct
//! with `ValueEnum` selectors, package metadata pulled from `env!` at
//! compile time, and a small address-parsing helper alongside the derive.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - ", env!("CARGO_PKG_DESCRIPTION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Fm,
    Am,
    Dsb,
    Usb,
    Lsb,
    Cw,
    Nbfm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceKindArg {
    Rtlsdr,
    AirspyR2,
    AirspyHf,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputModeArg {
    RawInt16,
    RawFloat32,
    Wav,
    #[cfg(feature = "playback")]
    Playback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterWidthArg {
    Wide,
    Default,
    Medium,
    Narrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeemphasisArg {
    Us50,
    Us75,
}

/// SDR FM/AM/NBFM receiver: turns a tuner's IQ stream into audio.
#[derive(Debug, Parser)]
#[command(author = env!("CARGO_PKG_AUTHORS"), version = env!("CARGO_PKG_VERSION"), about = PKG_DESCRIPTION)]
pub struct Cli {
    /// Demodulation mode.
    #[arg(short = 'm', long = "mode", value_enum)]
    pub mode: ModeArg,

    /// Tuner device family.
    #[arg(short = 'd', long = "device", value_enum, default_value_t = DeviceKindArg::Rtlsdr)]
    pub device: DeviceKindArg,

    /// Device index, for systems with more than one tuner attached.
    #[arg(long = "device-index", default_value_t = 0)]
    pub device_index: u32,

    /// Comma-separated `key=value` device configuration string.
    #[arg(long = "device-config", default_value = "")]
    pub device_config: String,

    /// Output encoding / destination.
    #[arg(short = 'o', long = "output", value_enum, default_value_t = OutputModeArg::RawInt16)]
    pub output: OutputModeArg,

    /// Output file path; `-` or omitted means stdout for raw/WAV outputs.
    #[arg(value_name = "OUTPUT_PATH")]
    pub output_path: Option<PathBuf>,

    /// Audio buffer depth, in seconds, before the consumer starts draining.
    #[arg(long = "buffer-seconds", default_value_t = 0.2)]
    pub buffer_seconds: f32,

    /// Decode and output both stereo channels (FM only).
    #[arg(long = "stereo", default_value_t = true)]
    pub stereo: bool,

    /// Rotate the 38 kHz stereo subcarrier 90° for external QMM analysis.
    #[arg(long = "pilot-shift", default_value_t = false)]
    pub pilot_shift: bool,

    /// Deemphasis time constant.
    #[arg(long = "deemphasis", value_enum, default_value_t = DeemphasisArg::Us75)]
    pub deemphasis: DeemphasisArg,

    /// IF/NBFM channel filter width selector.
    #[arg(long = "filter-width", value_enum, default_value_t = FilterWidthArg::Default)]
    pub filter_width: FilterWidthArg,

    /// Squelch threshold in dB; signals below this level are muted.
    #[arg(long = "squelch-db", default_value_t = -150.0)]
    pub squelch_db: f32,

    /// Multipath equalizer tap count (0 disables the equalizer). Must be odd.
    #[arg(long = "multipath-stages")]
    pub multipath_stages: Option<usize>,

    /// IF sample-rate correction, in parts per million.
    #[arg(long = "if-rate-offset-ppm", default_value_t = 0.0, allow_negative_numbers = true)]
    pub if_rate_offset_ppm: f64,

    /// Write PPS timing events to this file.
    #[arg(long = "pps-file")]
    pub pps_file: Option<PathBuf>,

    /// Override the log level (error, warn, info, debug, trace).
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

