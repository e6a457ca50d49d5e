use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Serializes any report to JSON.
pub fn export_json<T: Serialize + ?Sized>(value: &T, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writeln!(output, "{}", json)?;
    Ok(())
}

/// Writes JSON to `path`, or stdout when no path is given.
pub fn write_json<T: Serialize + ?Sized>(value: &T, pretty: bool, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            export_json(value, pretty, &mut file)?;
            info!("Report written to: {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            export_json(value, pretty, &mut stdout.lock())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::report::SkipReason;
    use crate::sync::{BulkSyncReport, MilestoneField, SyncResult};

    fn sample_report() -> BulkSyncReport {
        let mut report = BulkSyncReport::new("IDEA", false);
        let mut result = SyncResult::new(Some("AV-1"), "IDEA-1", false);
        result.fields_copied.insert(MilestoneField::PrdDueDate);
        result
            .fields_skipped
            .insert(MilestoneField::StartDate, SkipReason::NoValueOnSource);
        result.settle();
        report.record(result);
        report
    }

    #[test]
    fn test_export_json() {
        let mut output = Vec::new();
        export_json(&sample_report(), false, &mut output).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["project"], "IDEA");
        assert_eq!(value["succeeded"], 1);
        assert_eq!(value["results"][0]["status"], "success");
        assert_eq!(value["results"][0]["fields_copied"][0], "PrdDueDate");
        assert_eq!(
            value["results"][0]["fields_skipped"]["StartDate"]["reason"],
            "no-value-on-source"
        );
    }

    #[test]
    fn test_export_json_pretty() {
        let mut output = Vec::new();
        export_json(&sample_report(), true, &mut output).unwrap();
        let json_str = String::from_utf8(output).unwrap();
        assert!(json_str.contains("\n  \"project\": \"IDEA\""));
    }

    #[test]
    fn test_write_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&sample_report(), false, Some(&path)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"IDEA-1\""));
    }
}
