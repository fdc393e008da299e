// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Adapts an [`AudioSink`] to [`sdrfm_core::pipeline::AudioConsumer`].
//!
//! The sink is held behind `Arc<Mutex<_>>` rather than owned outright:
//! [`sdrfm_core::pipeline::Orchestrator::spawn`] takes the consumer by
//! value and moves it into the consumer thread, but `main.rs` still needs
//! to call [`AudioSink::finish`] (to rewrite the WAV header) once that
//! thread has drained the queue and [`sdrfm_core::pipeline::Orchestrator::join`]
//! returns. A shared clone kept by the caller gives it that access without
//! relying on `Drop` ordering inside the worker thread.

use std::sync::{Arc, Mutex};

use sdrfm_core::pipeline::{AudioConsumer, ConsumerResult};
use sdrfm_core::SampleBlock;

use crate::sink::AudioSink;

pub struct SinkConsumer {
    sink: Arc<Mutex<Box<dyn AudioSink>>>,
}

impl SinkConsumer {
    /// Returns the consumer to hand to `Orchestrator::spawn` plus a shared
    /// handle the caller retains for the post-join `finish()` call.
    pub fn new(sink: Box<dyn AudioSink>) -> (Self, Arc<Mutex<Box<dyn AudioSink>>>) {
        let shared = Arc::new(Mutex::new(sink));
        (Self { sink: Arc::clone(&shared) }, shared)
    }
}

impl AudioConsumer for SinkConsumer {
    fn write_block(&mut self, block: SampleBlock) -> ConsumerResult {
        let mut sink = self.sink.lock().unwrap();
        match sink.write_block(&block) {
            Ok(()) => ConsumerResult::Ok,
            Err(e) if e.is_transient() => ConsumerResult::TransientError(e),
            Err(e) => ConsumerResult::FatalError(e),
        }
    }
}

/// Finalizes the WAV header (a no-op for raw/playback sinks).
pub fn finish(sink: &Arc<Mutex<Box<dyn AudioSink>>>) -> Result<(), sdrfm_core::CoreError> {
    sink.lock().unwrap().finish()
}
