// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `sdrfm`: SDR FM/AM/NBFM receiver binary.
//!
//! Grounded on the teacher's `trx-bin::main`: parse CLI, load the TOML
//! config as a fallback layer, init logging, build the hardware/decode/sink
//! trio, wire a Ctrl-C handler into the shared termination flag, then block
//! on the pipeline until it drains.

mod chain;
mod cli;
mod config;
mod consumer;
mod device;
mod logging;
mod pps;
mod signal;
mod sink;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use sdrfm_core::am::{AmDecoder, AmDecoderConfig, AmMode};
use sdrfm_core::fm::{FmDecoder, FmDecoderConfig, StereoDetectPolicy};
use sdrfm_core::nbfm::{NbfmDecoder, NbfmDecoderConfig, NbfmFilterWidth};
use sdrfm_core::pipeline::{DecodeChain, Orchestrator, OrchestratorConfig};

use cli::{Cli, DeemphasisArg, DeviceKindArg, FilterWidthArg, ModeArg, OutputModeArg};
use config::{ConfigFile, ReceiverConfig};
use consumer::SinkConsumer;
use device::{build_device, DeviceIqProducer, DeviceKind};
use sink::{AudioSink, RawFloat32Sink, RawInt16Sink, WavSink};

const DEFAULT_FREQUENCY_HZ: f64 = 100_300_000.0;
const DEFAULT_IF_RATE_HZ: f64 = 384_000.0;
const DEFAULT_PCM_RATE_HZ: f64 = 48_000.0;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (file_config, config_path) = match ReceiverConfig::load_from_default_paths() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("failed to load config file: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_level = cli.log_level.as_deref().or(file_config.log_level.as_deref());
    logging::init_logging(log_level);
    if let Some(path) = &config_path {
        tracing::info!(path = %path.display(), "loaded configuration file");
    }

    match run(cli, file_config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, file_config: ReceiverConfig) -> Result<(), String> {
    let device_config = if cli.device_config.is_empty() { file_config.device_config.clone() } else { cli.device_config.clone() };
    let frequency_hz = config_value(&device_config, "frequency").unwrap_or(DEFAULT_FREQUENCY_HZ);
    let device_kind = map_device_kind(cli.device);

    // `file` devices take their IQ source path from the device-config
    // string (`path=...`), the same `key=value` surface spec.md §6 already
    // uses for frequency/gain, rather than inventing a separate flag the
    // spec's CLI surface does not list.
    let file_path: Option<PathBuf> = device_config
        .split(',')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| *k == "path")
        .map(|(_, v)| PathBuf::from(v));

    let device = build_device(
        device_kind,
        cli.device_index,
        &device_config,
        file_path.as_deref(),
        DEFAULT_IF_RATE_HZ,
        frequency_hz,
    )
    .map_err(|e| format!("device initialization failed: {e}"))?;

    let if_rate_hz = apply_ppm_offset(device.sample_rate(), cli.if_rate_offset_ppm);
    let pcm_rate_hz = DEFAULT_PCM_RATE_HZ;
    let channels: u16 = if cli.mode == ModeArg::Fm && cli.stereo { 2 } else { 1 };

    let pps_file = cli.pps_file.clone().or_else(|| file_config.pps_file.clone());
    // normalized once after merging both sources, so a config-file value
    // gets the same odd-count rounding as a `--multipath-stages` flag.
    let multipath_stages = cli.multipath_stages.or(file_config.multipath_stages).map(round_up_to_odd);

    let decode_chain: Box<dyn DecodeChain> =
        build_decode_chain(&cli, if_rate_hz, pcm_rate_hz, multipath_stages, pps_file.as_deref())?;

    let sink: Box<dyn AudioSink> = build_sink(&cli, pcm_rate_hz as u32, channels)?;
    let (sink_consumer, sink_handle) = SinkConsumer::new(sink);

    let block_len = (if_rate_hz * cli.buffer_seconds as f64).max(1.0) as usize;
    let producer = DeviceIqProducer::new(device, block_len);

    let orchestrator_config = OrchestratorConfig {
        if_rate_hz,
        buf_minfill: ((pcm_rate_hz * channels as f64 * cli.buffer_seconds as f64) as usize).max(480),
        iq_queue_capacity_samples: (if_rate_hz * 2.0) as usize,
        audio_queue_capacity_samples: (pcm_rate_hz * channels as f64 * 2.0) as usize,
    };

    let on_metrics: Option<Box<dyn FnMut(&sdrfm_core::pipeline::Metrics) + Send>> = Some(Box::new(move |m| {
        tracing::debug!(
            blocks = m.blocks_processed,
            pilot_locked = m.pilot_locked,
            if_level = m.if_level,
            audio_level = m.audio_level,
            "pipeline progress"
        );
    }));

    let orchestrator =
        Orchestrator::spawn(Box::new(producer), decode_chain, Box::new(sink_consumer), orchestrator_config, on_metrics);

    let termination = orchestrator.termination_flag();
    signal::install_termination_handler(Arc::clone(&termination)).map_err(|e| e.to_string())?;

    orchestrator.join();
    consumer::finish(&sink_handle).map_err(|e| e.to_string())?;
    Ok(())
}

fn map_device_kind(arg: DeviceKindArg) -> DeviceKind {
    match arg {
        DeviceKindArg::Rtlsdr => DeviceKind::RtlSdr,
        DeviceKindArg::AirspyR2 => DeviceKind::AirspyR2,
        DeviceKindArg::AirspyHf => DeviceKind::AirspyHf,
        DeviceKindArg::File => DeviceKind::File,
    }
}

fn config_value(device_config: &str, key: &str) -> Option<f64> {
    device_config
        .split(',')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| v.parse::<f64>().ok())
}

fn apply_ppm_offset(rate_hz: f64, ppm: f64) -> f64 {
    rate_hz * (1.0 + ppm / 1_000_000.0)
}

/// `MultipathEqualizer::new` requires an odd tap count; round up rather
/// than reject so both `--multipath-stages` and the config-file equivalent
/// accept an even value.
fn round_up_to_odd(n: usize) -> usize {
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

fn build_decode_chain(
    cli: &Cli,
    if_rate_hz: f64,
    pcm_rate_hz: f64,
    multipath_stages: Option<usize>,
    pps_file: Option<&std::path::Path>,
) -> Result<Box<dyn DecodeChain>, String> {
    match cli.mode {
        ModeArg::Fm => {
            let deemphasis_tau_us = match cli.deemphasis {
                DeemphasisArg::Us50 => 50.0,
                DeemphasisArg::Us75 => 75.0,
            };
            let config = FmDecoderConfig {
                if_rate_hz,
                pcm_rate_hz,
                deemphasis_tau_us,
                pilot_shift: cli.pilot_shift,
                multipath_stages,
                stereo_detect_policy: StereoDetectPolicy::FollowPilotLock,
                ..Default::default()
            };
            let decoder = FmDecoder::new(config);
            let pps_writer = pps_file.map(pps::PpsWriter::create_fm).transpose().map_err(|e| e.to_string())?;
            Ok(Box::new(chain::FmChain::new(decoder, pps_writer, cli.squelch_db)))
        }
        ModeArg::Nbfm => {
            let config = NbfmDecoderConfig {
                if_rate_hz,
                pcm_rate_hz,
                filter_width: map_filter_width(cli.filter_width),
                ..Default::default()
            };
            let decoder = NbfmDecoder::new(config);
            let pps_writer = pps_file.map(pps::PpsWriter::create_periodic).transpose().map_err(|e| e.to_string())?;
            Ok(Box::new(chain::NbfmChain::new(decoder, pps_writer, cli.squelch_db)))
        }
        ModeArg::Am | ModeArg::Dsb | ModeArg::Usb | ModeArg::Lsb | ModeArg::Cw => {
            let mode = match cli.mode {
                ModeArg::Am => AmMode::Am,
                ModeArg::Dsb => AmMode::Dsb,
                ModeArg::Usb => AmMode::Usb,
                ModeArg::Lsb => AmMode::Lsb,
                ModeArg::Cw => AmMode::Cw,
                _ => unreachable!(),
            };
            let config = AmDecoderConfig { if_rate_hz, pcm_rate_hz, mode, ..Default::default() };
            let decoder = AmDecoder::new(config);
            let pps_writer = pps_file.map(pps::PpsWriter::create_periodic).transpose().map_err(|e| e.to_string())?;
            Ok(Box::new(chain::AmChain::new(decoder, pps_writer, cli.squelch_db)))
        }
    }
}

fn map_filter_width(arg: FilterWidthArg) -> NbfmFilterWidth {
    match arg {
        FilterWidthArg::Wide => NbfmFilterWidth::Narrow20,
        FilterWidthArg::Default => NbfmFilterWidth::Narrow10,
        FilterWidthArg::Medium => NbfmFilterWidth::Narrow8,
        FilterWidthArg::Narrow => NbfmFilterWidth::Narrow625,
    }
}

fn build_sink(cli: &Cli, sample_rate_hz: u32, channels: u16) -> Result<Box<dyn AudioSink>, String> {
    match cli.output {
        OutputModeArg::RawInt16 => {
            Ok(Box::new(RawInt16Sink::new(cli.output_path.as_deref()).map_err(|e| e.to_string())?))
        }
        OutputModeArg::RawFloat32 => {
            Ok(Box::new(RawFloat32Sink::new(cli.output_path.as_deref()).map_err(|e| e.to_string())?))
        }
        OutputModeArg::Wav => {
            let path = cli.output_path.as_deref().ok_or("`--output wav` requires an OUTPUT_PATH")?;
            Ok(Box::new(WavSink::create(path, sample_rate_hz, channels).map_err(|e| e.to_string())?))
        }
        #[cfg(feature = "playback")]
        OutputModeArg::Playback => {
            Ok(Box::new(sink::PlaybackSink::open(sample_rate_hz, channels).map_err(|e| e.to_string())?))
        }
    }
}
