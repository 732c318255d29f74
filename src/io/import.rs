//! CSV loading into [`RawTable`].

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::DataError;
use crate::ingest::RawTable;

/// Reads a CSV file with a header row.
///
/// # Errors
///
/// [`DataError::Io`] when the file cannot be opened, [`DataError::Csv`] when
/// it is not valid CSV.
pub fn read_table(path: &Path) -> Result<RawTable, DataError> {
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    read_table_from(io::BufReader::new(file))
}

/// Reads CSV from any reader. Rows may have differing lengths; cells are
/// trimmed.
///
/// # Errors
///
/// [`DataError::Csv`] on malformed input.
pub fn read_table_from(reader: impl Read) -> Result<RawTable, DataError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(RawTable::new(headers, rows))
}
