//! Output helpers.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Table or JSON output, chosen by `--json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json: bool,
}

impl Output {
    pub const fn new(json: bool) -> Self {
        Self { json }
    }

    /// Pretty JSON on stdout.
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> portal_core::Result<()> {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, value)?;
        writeln!(out)?;
        Ok(())
    }

    /// JSON when `--json` is set, otherwise whatever `table` writes.
    pub fn emit<T, F>(&self, value: &T, table: F) -> portal_core::Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        if self.json {
            self.print_json(value)
        } else {
            let mut out = io::stdout().lock();
            table(&mut out)?;
            Ok(())
        }
    }
}

/// Unix seconds as `YYYY-MM-DD HH:MM:SS` UTC.
pub fn format_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map_or_else(|| ts.to_string(), |d| d.format("%Y-%m-%d %H:%M:%S").to_string())
}

pub fn format_opt_ts(ts: Option<i64>) -> String {
    ts.map_or_else(|| "-".to_string(), format_ts)
}
