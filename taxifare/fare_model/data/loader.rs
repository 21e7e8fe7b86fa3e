use std::{fs::File, io::Read, path::Path};

use csv::{ReaderBuilder, Trim, Writer};

use super::{
    schema::{RawTrip, Trip},
    DataError,
};

/// Rows read by the training entry point when no limit is configured.
pub const DEFAULT_NROWS: usize = 10_000;

/// Reads raw trips from a CSV file with a header row, keeping at most `nrows` rows.
pub fn get_data(path: impl AsRef<Path>, nrows: Option<usize>) -> Result<Vec<RawTrip>, DataError> {
    let file = File::open(path.as_ref())?;
    read_trips(file, nrows)
}

/// Reads raw trips from any CSV source.
///
/// Columns are matched by header name; unknown columns are ignored and empty or
/// unparseable cells become missing values for the cleaner to drop.
pub fn read_trips<R: Read>(reader: R, nrows: Option<usize>) -> Result<Vec<RawTrip>, DataError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);
    rdr.deserialize::<RawTrip>()
        .take(nrows.unwrap_or(usize::MAX))
        .map(|row| row.map_err(DataError::from))
        .collect()
}

/// Writes trips in the layout [`get_data`] reads.
pub fn write_csv(path: impl AsRef<Path>, trips: &[Trip]) -> Result<(), DataError> {
    let mut writer = Writer::from_path(path.as_ref())?;
    for trip in trips {
        writer.serialize(RawTrip::from(trip))?;
    }
    writer.flush()?;
    Ok(())
}
