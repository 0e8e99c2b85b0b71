//! Turning decoded telemetry samples into rows and summary statistics.

use std::io::Write;

use aiclk_throttler::telemetry::TelemetrySample;
use serde::Serialize;

/// One output row per recorded sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub slot: usize,
    pub timestamp: u32,
    /// Seconds since the first sample.
    pub elapsed_s: f64,
    pub tdp_power_w: f32,
    pub board_power_w: f32,
}

/// Build rows, converting raw timer ticks to seconds at `timer_hz`.
///
/// Elapsed time uses wrapping subtraction so a 32-bit timer rollover
/// between samples still yields increasing times.
pub fn rows(samples: &[TelemetrySample], timer_hz: f64) -> Vec<Row> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };

    let mut elapsed_ticks: u64 = 0;
    let mut previous = first.timestamp;

    samples
        .iter()
        .enumerate()
        .map(|(slot, sample)| {
            elapsed_ticks += u64::from(sample.timestamp.wrapping_sub(previous));
            previous = sample.timestamp;
            Row {
                slot,
                timestamp: sample.timestamp,
                elapsed_s: elapsed_ticks as f64 / timer_hz,
                tdp_power_w: sample.tdp_power,
                board_power_w: sample.board_power,
            }
        })
        .collect()
}

/// Average, minimum and maximum of one power series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerStats {
    pub avg: f32,
    pub min: f32,
    pub max: f32,
}

impl PowerStats {
    pub fn from_values(values: impl IntoIterator<Item = f32>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0f64;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;

        for value in values {
            count += 1;
            sum += f64::from(value);
            min = min.min(value);
            max = max.max(value);
        }

        (count > 0).then(|| Self {
            avg: (sum / count as f64) as f32,
            min,
            max,
        })
    }
}

pub fn write_csv(rows: &[Row], out: impl Write) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_table(rows: &[Row], mut out: impl Write) -> anyhow::Result<()> {
    writeln!(
        out,
        "{:>5}  {:>10}  {:>10}  {:>10}  {:>10}",
        "slot", "timestamp", "time (s)", "TDP (W)", "board (W)"
    )?;
    for row in rows {
        writeln!(
            out,
            "{:>5}  {:>10}  {:>10.4}  {:>10.2}  {:>10.2}",
            row.slot, row.timestamp, row.elapsed_s, row.tdp_power_w, row.board_power_w
        )?;
    }
    Ok(())
}

pub fn write_summary(rows: &[Row], mut out: impl Write) -> anyhow::Result<()> {
    writeln!(out, "Found {} telemetry samples", rows.len())?;

    let series = [
        ("TDP Power", PowerStats::from_values(rows.iter().map(|r| r.tdp_power_w))),
        ("Board Power", PowerStats::from_values(rows.iter().map(|r| r.board_power_w))),
    ];
    for (name, stats) in series {
        if let Some(s) = stats {
            writeln!(
                out,
                "{name}: avg={:.2}W, min={:.2}W, max={:.2}W",
                s.avg, s.min, s.max
            )?;
        }
    }

    if let Some(last) = rows.last() {
        writeln!(out, "Time range: 0 to {:.4} s", last.elapsed_s)?;
    }

    Ok(())
}
