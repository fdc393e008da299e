// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! SIGINT/SIGTERM wiring into the pipeline's termination flag (spec.md §5
//! "asynchronous flag set by the OS event").
//!
//! Grounded on the `ctrlc::set_handler` pattern used in the pack's RTL-SDR
//! AM example (`examples-simple_am.rs`): a shared `AtomicBool`, flipped
//! from the signal handler with `Ordering::Relaxed`, polled by the main
//! loop. This crate's pipeline polls with `Ordering::Acquire` instead
//! (spec.md §5), so the handler release-stores.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sdrfm_core::CoreError;

/// Installs a Ctrl-C / SIGTERM handler that sets `flag` and returns
/// immediately; the pipeline's own threads observe it at block boundaries.
pub fn install_termination_handler(flag: Arc<AtomicBool>) -> Result<(), CoreError> {
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Release);
    })
    .map_err(|e| CoreError::permanent(format!("failed to install signal handler: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_installation_reports_a_flag_the_caller_still_owns() {
        let flag = Arc::new(AtomicBool::new(false));
        assert!(!flag.load(Ordering::Acquire));
    }
}
