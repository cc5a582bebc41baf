//! CSV export of the dose ledger.

use crate::{Dose, Result};
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: String,
    amount_mg: f64,
    consumed_at: String,
}

impl From<&Dose> for CsvRow {
    fn from(dose: &Dose) -> Self {
        CsvRow {
            id: dose.id.to_string(),
            amount_mg: dose.amount_mg,
            consumed_at: dose.consumed_at.to_rfc3339(),
        }
    }
}

/// Write `doses` to a CSV file at `path`, replacing any existing file.
///
/// Returns the number of rows written.
pub fn export_csv(doses: &[Dose], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    for dose in doses {
        writer.serialize(CsvRow::from(dose))?;
    }

    writer.flush()?;
    tracing::info!("Exported {} doses to {:?}", doses.len(), path);
    Ok(doses.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_export_writes_header_and_rows() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("out").join("doses.csv");
        let now = Utc::now();
        let doses = vec![
            Dose::new(95.0, now - Duration::hours(2)),
            Dose::new(64.0, now),
        ];

        let count = export_csv(&doses, &path).unwrap();
        assert_eq!(count, 2);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader
            .headers()
            .unwrap()
            .iter()
            .map(String::from)
            .collect();
        assert_eq!(headers, vec!["id", "amount_mg", "consumed_at"]);

        let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], doses[0].id.to_string().as_str());
        assert_eq!(&rows[1][1], "64.0");
    }

    #[test]
    fn test_export_empty_ledger() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("doses.csv");

        assert_eq!(export_csv(&[], &path).unwrap(), 0);
        assert!(path.exists());
    }
}
