// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Error taxonomy (spec.md §7).
//!
//! Grounded on `trx-core::rig::response::RigError`'s `{ message, kind }`
//! split between transient (may succeed on retry) and permanent failures.
//! Internal DSP blocks never construct or propagate [`CoreError`] — per
//! spec.md §7 they self-heal (the multipath equalizer resets itself) rather
//! than surface anomalies. It exists for the boundary the orchestrator sits
//! on: device and sink errors.

use thiserror::Error;

/// Classification mirroring spec.md §7's taxonomy: device/sink failures at
/// startup or persistent failures mid-run are `Permanent` (fatal); isolated
/// benign conditions (a single write underflow) are `Transient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CoreError {
    pub message: String,
    pub kind: ErrorKind,
}

impl CoreError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Transient,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}
