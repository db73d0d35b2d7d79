//! `datalogger` CLI
//!
//! Offline tooling for the session logs written by the storage sink: printing their records, verifying and repairing
//! their framing, and checking configuration snapshots before they are deployed.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::io::Write;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use comfy_table::{Cell, Color, Table};
use datalogger_core::config::Config;
use datalogger_core::publish::text;
use datalogger_core::reading::Record;
use datalogger_core::storage::frame::{self, Scan};
use datalogger_osal_std::storage::FileMedium;

/// Datalogger CLI interface
///
/// Inspects session logs copied off a logger's storage medium.
#[derive(clap::Parser, Debug)]
#[command(disable_help_subcommand = true, version)]
pub struct Arguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Prints every record of a session log.
    Dump {
        /// The session log to read.
        file: Utf8PathBuf,

        /// How records are printed.
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },

    /// Verifies the framing of a session log, failing if it is damaged.
    Check {
        /// The session log to verify.
        file: Utf8PathBuf,
    },

    /// Truncates the torn frame left at the end of a session log by a power loss.
    Repair {
        /// The session log to repair in place.
        file: Utf8PathBuf,
    },

    /// Lists the session logs in a log directory.
    Sessions {
        /// The directory the logger writes its sessions to.
        dir: Utf8PathBuf,
    },

    /// Validates a configuration snapshot and prints it with all defaults filled in.
    Config {
        /// JSON snapshot to validate; the built-in defaults are printed when omitted.
        #[arg(long)]
        file: Option<Utf8PathBuf>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    /// A table with one row per record.
    Table,
    /// One JSON object per line.
    Json,
    /// The lines sent to the serial and BLE outputs.
    Text,
}

impl Arguments {
    /// Runs the command, printing to stdout.
    pub fn run(self) -> anyhow::Result<()> {
        self.run_to(&mut std::io::stdout().lock())
    }

    /// Runs the command, printing to `out`.
    pub fn run_to(self, out: &mut dyn Write) -> anyhow::Result<()> {
        match self.command {
            Command::Dump { file, format } => dump(&file, format, out),
            Command::Check { file } => check(&file, out),
            Command::Repair { file } => repair(&file, out),
            Command::Sessions { dir } => sessions(&dir, out),
            Command::Config { file } => config(file.as_deref(), out),
        }
    }
}

fn read_log(file: &Utf8Path) -> anyhow::Result<Vec<u8>> {
    fs_err::read(file).context("reading session log")
}

fn dump(file: &Utf8Path, format: Format, out: &mut dyn Write) -> anyhow::Result<()> {
    let log = read_log(file)?;
    let scan = frame::scan(&log);
    if scan.corrupt_frames > 0 || scan.trailing_bytes > 0 {
        tracing::warn!(
            %file,
            corrupt_frames = scan.corrupt_frames,
            trailing_bytes = scan.trailing_bytes,
            "log is damaged, printing the records that could be read"
        );
    }

    match format {
        Format::Table => {
            writeln!(
                out,
                "{}",
                Table::new()
                    .load_preset(comfy_table::presets::UTF8_FULL)
                    .set_header(["Session", "Seq", "Tick (ms)", "Wall (ms)", "Source", "Valid", "Fields"])
                    .add_rows(scan.records.iter().map(record_row))
            )?;
        }
        Format::Json => {
            for record in &scan.records {
                writeln!(
                    out,
                    "{}",
                    serde_json::to_string(record).context("serializing record")?
                )?;
            }
        }
        Format::Text => {
            for record in &scan.records {
                writeln!(out, "{}", text::format_line(record).trim_end())?;
            }
        }
    }
    Ok(())
}

fn record_row(record: &Record) -> [Cell; 7] {
    let reading = &record.reading;
    let line = text::format_line(record);
    // Drop the seq, tick and source columns the line starts with.
    let fields = line.trim_end().splitn(4, ',').nth(3).unwrap_or_default();
    [
        record.session.into(),
        record.seq.into(),
        reading.timestamp.tick.as_millis().into(),
        reading
            .timestamp
            .wall_millis
            .map_or_else(|| "-".to_owned(), |millis| millis.to_string())
            .into(),
        reading.source().tag().into(),
        Cell::new(reading.valid).fg(if reading.valid {
            Color::DarkGreen
        } else {
            Color::DarkRed
        }),
        fields.into(),
    ]
}

/// Sequence number discontinuities within a session.
fn seq_gaps(records: &[Record]) -> usize {
    records
        .windows(2)
        .filter(|pair| pair[0].session == pair[1].session && pair[1].seq != pair[0].seq + 1)
        .count()
}

fn write_report(file: &Utf8Path, log_len: usize, scan: &Scan, out: &mut dyn Write) -> anyhow::Result<()> {
    let sessions: BTreeSet<u32> = scan.records.iter().map(|record| record.session).collect();
    let seq_range = match (scan.records.first(), scan.records.last()) {
        (Some(first), Some(last)) => format!("{}..={}", first.seq, last.seq),
        _ => "-".to_owned(),
    };

    writeln!(out, "{file}")?;
    writeln!(out, "  bytes:          {log_len}")?;
    writeln!(out, "  frames:         {}", scan.records.len())?;
    writeln!(
        out,
        "  sessions:       {}",
        sessions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    )?;
    writeln!(out, "  seq:            {seq_range}")?;
    writeln!(out, "  seq gaps:       {}", seq_gaps(&scan.records))?;
    writeln!(out, "  corrupt frames: {}", scan.corrupt_frames)?;
    writeln!(out, "  trailing bytes: {}", scan.trailing_bytes)?;
    Ok(())
}

fn check(file: &Utf8Path, out: &mut dyn Write) -> anyhow::Result<()> {
    let log = read_log(file)?;
    let scan = frame::scan(&log);
    write_report(file, log.len(), &scan, out)?;

    if scan.corrupt_frames > 0 || scan.trailing_bytes > 0 {
        anyhow::bail!(
            "{file} is damaged: {} corrupt frames, {} trailing bytes",
            scan.corrupt_frames,
            scan.trailing_bytes
        );
    }
    Ok(())
}

fn repair(file: &Utf8Path, out: &mut dyn Write) -> anyhow::Result<()> {
    let log = read_log(file)?;
    let scan = frame::scan(&log);

    if scan.corrupt_frames > 0 {
        tracing::warn!(
            %file,
            corrupt_frames = scan.corrupt_frames,
            "damaged frames before the end of the log are left in place"
        );
    }
    if scan.trailing_bytes == 0 {
        writeln!(out, "{file}: nothing to repair")?;
        return Ok(());
    }

    let valid_len = scan.valid_len(log.len());
    fs_err::OpenOptions::new()
        .write(true)
        .open(file.as_std_path())?
        .set_len(valid_len as u64)
        .context("truncating session log")?;
    tracing::info!(%file, bytes = scan.trailing_bytes, "dropped torn trailing frame");

    writeln!(
        out,
        "{file}: truncated {} trailing bytes, kept {} records",
        scan.trailing_bytes,
        scan.records.len()
    )?;
    Ok(())
}

fn sessions(dir: &Utf8Path, out: &mut dyn Write) -> anyhow::Result<()> {
    let medium = FileMedium::new(dir.as_std_path());
    let ids = medium
        .sessions()
        .with_context(|| format!("listing sessions in {dir}"))?;

    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        let path = medium.path(id);
        let log = fs_err::read(&path).context("reading session log")?;
        let scan = frame::scan(&log);
        let damaged = scan.corrupt_frames > 0 || scan.trailing_bytes > 0;
        rows.push([
            Cell::new(id),
            Cell::new(path.display()),
            Cell::new(log.len()),
            Cell::new(scan.records.len()),
            Cell::new(if damaged { "damaged" } else { "ok" }).fg(if damaged {
                Color::DarkRed
            } else {
                Color::DarkGreen
            }),
        ]);
    }

    writeln!(
        out,
        "{}",
        Table::new()
            .load_preset(comfy_table::presets::UTF8_FULL)
            .set_header(["Session", "File", "Bytes", "Records", "Framing"])
            .add_rows(rows)
    )?;
    Ok(())
}

fn config(file: Option<&Utf8Path>, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = match file {
        Some(file) => {
            let json = fs_err::read_to_string(file).context("reading configuration")?;
            Config::from_json(&json).with_context(|| format!("invalid configuration in {file}"))?
        }
        None => Config::default(),
    };

    writeln!(
        out,
        "{}",
        serde_json::to_string_pretty(&config).context("serializing configuration")?
    )?;
    Ok(())
}
