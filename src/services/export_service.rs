use anyhow::Result;

use crate::models::dataset::Row;

/// Renders sanitized result rows as downloadable documents.
pub struct ExportService;

impl ExportService {
    /// CSV bytes for a result set. Header order follows the first row's
    /// key order, which the sanitizer keeps aligned with the query's
    /// column order; nulls render as empty cells.
    pub fn to_csv(rows: &[Row]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        if let Some(first) = rows.first() {
            writer.write_record(first.keys())?;
            for row in rows {
                let record: Vec<String> = first
                    .keys()
                    .map(|key| match row.get(key) {
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(serde_json::Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    })
                    .collect();
                writer.write_record(&record)?;
            }
        }

        Ok(writer.into_inner()?)
    }
}
