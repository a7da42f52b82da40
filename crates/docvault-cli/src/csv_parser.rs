//! CSV parser: header row names the columns, every other row becomes a record.

use async_trait::async_trait;
use docvault_core::{DocumentParser, ParsedContent, RowCells, RowRecord, VaultError, VaultResult};
use serde_json::{Number, Value};

/// Parses comma separated files with a header row.
#[derive(Debug, Clone, Copy)]
pub struct CsvParser {
    delimiter: u8,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvParser {
    /// Parser with a custom field delimiter.
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    fn headers(raw: &csv::StringRecord) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(raw.len());
        for (i, name) in raw.iter().enumerate() {
            let name = name.trim();
            if name.is_empty() || names.iter().any(|n| n == name) {
                names.push(format!("column_{}", i + 1));
            } else {
                names.push(name.to_string());
            }
        }
        names
    }
}

fn cell_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

#[async_trait]
impl DocumentParser for CsvParser {
    async fn parse(&self, bytes: &[u8]) -> VaultResult<ParsedContent> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);
        let headers = Self::headers(
            reader
                .headers()
                .map_err(|e| VaultError::Parse(format!("csv header: {}", e)))?,
        );

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| VaultError::Parse(format!("csv record: {}", e)))?;
            let mut cells = RowCells::new();
            for (i, raw) in record.iter().enumerate() {
                let key = headers
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("column_{}", i + 1));
                cells.insert(key, cell_value(raw));
            }
            rows.push(RowRecord::new(cells));
        }
        Ok(ParsedContent::Rows(rows))
    }
}
