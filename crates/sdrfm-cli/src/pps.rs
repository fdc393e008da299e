// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! PPS timing output file (spec.md §6 "PPS output format").
//!
//! Grounded on the teacher's logging conventions for fixed-width
//! structured text output; there is no direct teacher precedent for this
//! particular file format, so column widths and precision are taken
//! verbatim from spec.md's `%8s %14s %18.6f` / `%8d %18.6f` specifiers.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use sdrfm_core::CoreError;

/// Writes the FM pilot's PPS events, or (for AM/NBFM, which have no pilot)
/// a periodic per-block heartbeat, to a file in the format spec.md §6
/// fixes for each case.
pub struct PpsWriter {
    file: BufWriter<File>,
}

impl PpsWriter {
    /// Opens `path` and writes the FM-specific header line.
    pub fn create_fm(path: &Path) -> Result<Self, CoreError> {
        let mut file = BufWriter::new(
            File::create(path)
                .map_err(|e| CoreError::permanent(format!("failed to create PPS file {}: {e}", path.display())))?,
        );
        writeln!(file, "#pps_index sample_index   unix_time")
            .map_err(|e| CoreError::permanent(format!("failed to write PPS header: {e}")))?;
        Ok(Self { file })
    }

    /// Opens `path` and writes the non-FM header line.
    pub fn create_periodic(path: &Path) -> Result<Self, CoreError> {
        let mut file = BufWriter::new(
            File::create(path)
                .map_err(|e| CoreError::permanent(format!("failed to create PPS file {}: {e}", path.display())))?,
        );
        writeln!(file, "#  block   unix_time")
            .map_err(|e| CoreError::permanent(format!("failed to write PPS header: {e}")))?;
        Ok(Self { file })
    }

    /// Appends one pilot-derived PPS event (FM mode).
    pub fn write_fm_event(&mut self, pps_index: u64, sample_index: u64) -> Result<(), CoreError> {
        let unix_time = now_unix_seconds();
        writeln!(self.file, "{pps_index:>8} {sample_index:>14} {unix_time:>18.6}")
            .map_err(|e| CoreError::transient(format!("PPS file write error: {e}")))
    }

    /// Appends one periodic block heartbeat (non-FM modes, no pilot).
    pub fn write_periodic_event(&mut self, block_index: u64) -> Result<(), CoreError> {
        let unix_time = now_unix_seconds();
        writeln!(self.file, "{block_index:>8} {unix_time:>18.6}")
            .map_err(|e| CoreError::transient(format!("PPS file write error: {e}")))
    }

    pub fn flush(&mut self) -> Result<(), CoreError> {
        self.file.flush().map_err(|e| CoreError::transient(format!("PPS file flush error: {e}")))
    }
}

fn now_unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path).unwrap().lines().map(String::from).collect()
    }

    #[test]
    fn fm_output_has_the_documented_header_and_column_layout() {
        let mut path = std::env::temp_dir();
        path.push("sdrfm_pps_test_fm.txt");
        {
            let mut w = PpsWriter::create_fm(&path).unwrap();
            w.write_fm_event(1, 19_000).unwrap();
            w.write_fm_event(2, 38_000).unwrap();
            w.flush().unwrap();
        }
        let lines = read_lines(&path);
        assert_eq!(lines[0], "#pps_index sample_index   unix_time");
        assert!(lines[1].starts_with("       1          19000"));
        assert!(lines[2].starts_with("       2          38000"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn periodic_output_has_the_documented_header_and_column_layout() {
        let mut path = std::env::temp_dir();
        path.push("sdrfm_pps_test_periodic.txt");
        {
            let mut w = PpsWriter::create_periodic(&path).unwrap();
            w.write_periodic_event(0).unwrap();
            w.flush().unwrap();
        }
        let lines = read_lines(&path);
        assert_eq!(lines[0], "#  block   unix_time");
        assert!(lines[1].starts_with("       0"));
        std::fs::remove_file(&path).ok();
    }
}
