// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Audio output sinks (spec.md §6 "output modes"): raw interleaved PCM,
//! WAV, and (behind the `playback` feature) live speaker output.
//!
//! Grounded on `rf-audio-diff::golden`/`loader` for the `hound` WAV
//! read/write shape (`hound::WavSpec` + `WavWriter::create` +
//! `write_sample`), and on the `cpal` output-stream pattern shown across
//! `other_examples/` (`default_host` → `default_output_device` →
//! `build_output_stream` with a ring buffer feeding the audio callback).

use std::fs::File;
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;

use sdrfm_core::{CoreError, SampleBlock};

/// Sink-facing collaborator draining decoded audio (spec.md §6 output
/// capability surface); implements [`sdrfm_core::pipeline::AudioConsumer`]
/// through a thin wrapper in `main.rs` since that trait is block-oriented
/// and interleaving/finalization differ per encoding.
pub trait AudioSink: Send {
    /// Write one block of interleaved samples (`[L0, R0, L1, R1, ...]` for
    /// stereo, or mono samples back to back).
    fn write_block(&mut self, interleaved: &[f64]) -> Result<(), CoreError>;

    /// Flush/finalize (rewrite the WAV header with the final sample count).
    fn finish(&mut self) -> Result<(), CoreError> {
        Ok(())
    }
}

enum Destination {
    Stdout(Stdout),
    File(BufWriter<File>),
}

impl Write for Destination {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Destination::Stdout(s) => s.write(buf),
            Destination::File(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Destination::Stdout(s) => s.flush(),
            Destination::File(f) => f.flush(),
        }
    }
}

fn open_destination(path: Option<&Path>) -> Result<Destination, CoreError> {
    match path {
        None => Ok(Destination::Stdout(io::stdout())),
        Some(p) if p.as_os_str() == "-" => Ok(Destination::Stdout(io::stdout())),
        Some(p) => {
            let f = File::create(p)
                .map_err(|e| CoreError::permanent(format!("failed to create output file {}: {e}", p.display())))?;
            Ok(Destination::File(BufWriter::new(f)))
        }
    }
}

// ---------------------------------------------------------------------------
// Raw PCM sinks
// ---------------------------------------------------------------------------

/// Writes interleaved 16-bit signed little-endian PCM, clamped to
/// `[-32768, 32767]` (spec.md §6 `raw-int16`).
pub struct RawInt16Sink {
    dest: Destination,
}

impl RawInt16Sink {
    pub fn new(path: Option<&Path>) -> Result<Self, CoreError> {
        Ok(Self { dest: open_destination(path)? })
    }
}

impl AudioSink for RawInt16Sink {
    fn write_block(&mut self, interleaved: &[f64]) -> Result<(), CoreError> {
        let mut bytes = Vec::with_capacity(interleaved.len() * 2);
        for &s in interleaved {
            let scaled = (s * 32768.0).clamp(-32768.0, 32767.0) as i16;
            bytes.extend_from_slice(&scaled.to_le_bytes());
        }
        self.dest
            .write_all(&bytes)
            .map_err(|e| CoreError::transient(format!("raw-int16 sink write error: {e}")))
    }
}

/// Writes interleaved 32-bit float little-endian PCM, unclamped (spec.md
/// §6 `raw-float32`) so downstream tooling can see full-scale overshoot.
pub struct RawFloat32Sink {
    dest: Destination,
}

impl RawFloat32Sink {
    pub fn new(path: Option<&Path>) -> Result<Self, CoreError> {
        Ok(Self { dest: open_destination(path)? })
    }
}

impl AudioSink for RawFloat32Sink {
    fn write_block(&mut self, interleaved: &[f64]) -> Result<(), CoreError> {
        let mut bytes = Vec::with_capacity(interleaved.len() * 4);
        for &s in interleaved {
            bytes.extend_from_slice(&(s as f32).to_le_bytes());
        }
        self.dest
            .write_all(&bytes)
            .map_err(|e| CoreError::transient(format!("raw-float32 sink write error: {e}")))
    }
}

// ---------------------------------------------------------------------------
// WAV sink
// ---------------------------------------------------------------------------

/// Writes a 16-bit PCM WAV file, channel count fixed at construction
/// (spec.md §6 `wav`). `hound` rewrites the RIFF/data chunk sizes when the
/// writer is finalized, so [`WavSink::finish`] must run before exit.
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate_hz: u32, channels: u16) -> Result<Self, CoreError> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: sample_rate_hz,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .map_err(|e| CoreError::permanent(format!("failed to create WAV file {}: {e}", path.display())))?;
        Ok(Self { writer: Some(writer) })
    }
}

impl AudioSink for WavSink {
    fn write_block(&mut self, interleaved: &[f64]) -> Result<(), CoreError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| CoreError::permanent("WAV sink written to after finish()"))?;
        for &s in interleaved {
            let scaled = (s * 32768.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(scaled)
                .map_err(|e| CoreError::transient(format!("WAV sink write error: {e}")))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CoreError> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| CoreError::permanent(format!("failed to finalize WAV file: {e}")))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Live playback sink
// ---------------------------------------------------------------------------

#[cfg(feature = "playback")]
mod playback {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    use sdrfm_core::CoreError;

    use super::AudioSink;

    /// Live speaker output (spec.md §6 `playback`). The decode thread
    /// pushes interleaved samples into a shared ring buffer; `cpal`'s
    /// realtime audio callback drains it, padding with silence on
    /// underrun rather than blocking the audio thread.
    pub struct PlaybackSink {
        buffer: Arc<Mutex<VecDeque<f32>>>,
        _stream: cpal::Stream,
    }

    impl PlaybackSink {
        pub fn open(sample_rate_hz: u32, channels: u16) -> Result<Self, CoreError> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| CoreError::permanent("no default audio output device"))?;

            let config = cpal::StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(sample_rate_hz),
                buffer_size: cpal::BufferSize::Default,
            };

            let buffer = Arc::new(Mutex::new(VecDeque::<f32>::new()));
            let callback_buffer = Arc::clone(&buffer);

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut buf = callback_buffer.lock().unwrap();
                        for sample in data.iter_mut() {
                            *sample = buf.pop_front().unwrap_or(0.0);
                        }
                    },
                    |err| tracing::error!(error = %err, "audio output stream error"),
                    None,
                )
                .map_err(|e| CoreError::permanent(format!("failed to build audio output stream: {e}")))?;

            stream
                .play()
                .map_err(|e| CoreError::permanent(format!("failed to start audio output stream: {e}")))?;

            Ok(Self { buffer, _stream: stream })
        }
    }

    impl AudioSink for PlaybackSink {
        fn write_block(&mut self, interleaved: &[f64]) -> Result<(), CoreError> {
            const MAX_BUFFERED: usize = 48_000 * 4;
            let mut buf = self.buffer.lock().unwrap();
            if buf.len() > MAX_BUFFERED {
                tracing::warn!("audio playback buffer overflow; dropping oldest samples");
                let excess = buf.len() - MAX_BUFFERED;
                buf.drain(0..excess);
            }
            buf.extend(interleaved.iter().map(|&s| s as f32));
            Ok(())
        }
    }
}

#[cfg(feature = "playback")]
pub use playback::PlaybackSink;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_int16_sink_clamps_and_scales_full_scale_values() {
        let mut path = std::env::temp_dir();
        path.push("sdrfm_sink_test_int16.raw");
        {
            let mut sink = RawInt16Sink::new(Some(&path)).unwrap();
            sink.write_block(&[1.0, -1.0, 2.0, -2.0]).unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![32767, -32768, 32767, -32768]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn raw_float32_sink_passes_values_through_unclamped() {
        let mut path = std::env::temp_dir();
        path.push("sdrfm_sink_test_f32.raw");
        {
            let mut sink = RawFloat32Sink::new(Some(&path)).unwrap();
            sink.write_block(&[1.5, -1.5]).unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(samples, vec![1.5, -1.5]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn wav_sink_produces_a_readable_file_after_finish() {
        let mut path = std::env::temp_dir();
        path.push("sdrfm_sink_test.wav");
        {
            let mut sink = WavSink::create(&path, 48_000, 2).unwrap();
            sink.write_block(&[0.5, -0.5, 0.25, -0.25]).unwrap();
            sink.finish().unwrap();
        }

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48_000);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 4);

        std::fs::remove_file(&path).ok();
    }
}
