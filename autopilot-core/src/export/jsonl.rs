//! JSON-Lines export of enriched events.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::events::EnrichedEvent;
use crate::Result;

/// Metadata sidecar written next to event exports.
#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub export_timestamp: String,
    pub event_count: usize,
    pub entity_count: usize,
    pub date_range: DateRange,
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Write events as JSON-Lines, one event per line.
pub fn export_jsonl(
    events: &[EnrichedEvent],
    output_dir: &Path,
    filename: Option<&str>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let name = match filename {
        Some(name) => name.to_string(),
        None => format!(
            "state_changes_{}.jsonl",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ),
    };
    let path = output_dir.join(name);

    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    info!("Exported {} events to {}", events.len(), path.display());
    Ok(path)
}

/// Load events from a JSON-Lines file. Blank lines are skipped.
pub fn load_jsonl(path: &Path) -> Result<Vec<EnrichedEvent>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}

/// Write the extraction metadata sidecar.
pub fn export_metadata(events: &[EnrichedEvent], output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let mut entities: Vec<String> = events.iter().map(|e| e.entity_id.clone()).collect();
    entities.sort();
    entities.dedup();

    let mut dates: Vec<&str> = events.iter().map(|e| e.date.as_str()).collect();
    dates.sort_unstable();

    let metadata = ExportMetadata {
        export_timestamp: chrono::Utc::now().to_rfc3339(),
        event_count: events.len(),
        entity_count: entities.len(),
        date_range: DateRange {
            start: dates.first().map(|d| (*d).to_string()),
            end: dates.last().map(|d| (*d).to_string()),
        },
        entities,
    };

    let path = output_dir.join("export_metadata.json");
    std::fs::write(&path, serde_json::to_string_pretty(&metadata)?)?;
    info!("Exported metadata to {}", path.display());
    Ok(path)
}
