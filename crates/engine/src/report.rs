//! Long-format CSV export
//!
//! One row per indicator or summary field:
//! `Symbol, Interval, Category, Indicator, Value`. The file is rewritten
//! from scratch on every run; nothing appends.

use anyhow::Result;
use std::io::Write;
use std::path::Path;

use crate::types::IndicatorSnapshot;

const HEADER: [&str; 5] = ["Symbol", "Interval", "Category", "Indicator", "Value"];

/// Write snapshot rows to any writer
pub fn write_csv<W: Write>(snapshots: &[IndicatorSnapshot], writer: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(HEADER)?;

    for snap in snapshots {
        let symbol = snap.symbol.as_str();
        let interval = snap.timeframe.label();

        let summary_rows = [
            ("RECOMMENDATION", snap.summary.recommendation.to_string()),
            ("BUY", snap.summary.buy.to_string()),
            ("SELL", snap.summary.sell.to_string()),
            ("NEUTRAL", snap.summary.neutral.to_string()),
        ];
        for (name, value) in &summary_rows {
            w.write_record([symbol, interval, "Summary", *name, value.as_str()])?;
        }

        w.write_record([
            symbol,
            interval,
            "Oscillators",
            "RECOMMENDATION",
            snap.oscillators.as_str(),
        ])?;
        w.write_record([
            symbol,
            interval,
            "Moving Averages",
            "RECOMMENDATION",
            snap.moving_averages.as_str(),
        ])?;

        for (name, value) in &snap.indicators {
            let rendered = value.to_string();
            w.write_record([symbol, interval, "Indicators", name.as_str(), rendered.as_str()])?;
        }
    }

    w.flush()?;
    Ok(())
}

/// Full-overwrite export to a file path
pub fn export_csv(snapshots: &[IndicatorSnapshot], path: impl AsRef<Path>) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_csv(snapshots, file)
}

/// Render the export in memory
pub fn csv_string(snapshots: &[IndicatorSnapshot]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(snapshots, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}
