//! Structured-row chunking: consecutive rows grouped `rows_per_chunk` at a time.
//! A group never spans two sheets and never splits a row.

use crate::chunking::{ChunkRecord, ChunkSink, ChunkStrategy};
use crate::error::{VaultError, VaultResult};
use crate::parser::{RowCells, RowRecord};
use serde_json::{json, Value};

fn is_blank(cells: &RowCells) -> bool {
    cells.values().all(|v| match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    })
}

/// Row group chunker.
#[derive(Debug, Clone, Copy)]
pub struct RowChunker {
    rows_per_chunk: usize,
}

struct Group<'a> {
    sheet: Option<&'a str>,
    rows: Vec<(usize, &'a RowCells)>,
}

impl RowChunker {
    /// Create a chunker grouping `rows_per_chunk` rows.
    pub fn new(rows_per_chunk: usize) -> VaultResult<Self> {
        if rows_per_chunk == 0 {
            return Err(VaultError::Configuration(
                "rows_per_chunk must be greater than zero".into(),
            ));
        }
        Ok(Self { rows_per_chunk })
    }

    /// Chunk rows. Row indices in metadata are positions in `rows`, inclusive.
    /// Blank rows stay in their group; input with no non-blank row yields no chunks.
    pub fn chunk(&self, rows: &[RowRecord]) -> VaultResult<Vec<ChunkRecord>> {
        if rows.iter().all(|row| is_blank(&row.cells)) {
            return Ok(Vec::new());
        }
        let mut sink = ChunkSink::default();
        let mut group: Option<Group<'_>> = None;

        for (row_index, row) in rows.iter().enumerate() {
            let sheet = row.sheet.as_deref();
            let full = match &group {
                Some(g) => g.sheet != sheet || g.rows.len() >= self.rows_per_chunk,
                None => false,
            };
            if full {
                if let Some(done) = group.take() {
                    emit(done, &mut sink)?;
                }
            }
            group
                .get_or_insert_with(|| Group {
                    sheet,
                    rows: Vec::with_capacity(self.rows_per_chunk),
                })
                .rows
                .push((row_index, &row.cells));
        }
        if let Some(done) = group {
            emit(done, &mut sink)?;
        }
        Ok(sink.finish())
    }
}

fn emit(group: Group<'_>, sink: &mut ChunkSink) -> VaultResult<()> {
    let mut columns: Vec<&str> = Vec::new();
    for (_, cells) in &group.rows {
        for key in cells.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }
    let cells: Vec<&RowCells> = group.rows.iter().map(|(_, c)| *c).collect();
    let content = serde_json::to_string(&cells)?;
    let (first, last) = match (group.rows.first(), group.rows.last()) {
        (Some(first), Some(last)) => (first.0, last.0),
        _ => return Ok(()),
    };
    sink.push(
        content,
        json!({
            "strategy": ChunkStrategy::StructuredRow.as_str(),
            "row_start": first,
            "row_end": last,
            "row_count": group.rows.len(),
            "sheet": group.sheet,
            "columns": columns,
        }),
    );
    Ok(())
}
