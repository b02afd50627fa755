//! Tabular parser and row serializer
//!
//! Reads already-decoded CSV files back into [`SignalRow`]s with absolute
//! timestamps, and writes rows out as CSV bytes for serving.
//!
//! Three layouts are accepted:
//! - headerless `timestamp,sender,value` (what the file converter writes)
//! - the same columns with a header row
//! - `sender,value,date_time` with a header row (what [`to_csv_bytes`] writes
//!   for normalized rows)
//!
//! Offsets in the `timestamp` column are milliseconds added to
//! [`reference_epoch`]. Whether they are decimal or hexadecimal is decided
//! once per file from the first data row: a decimal point means decimal
//! (truncated to whole milliseconds), anything else is read as hex.

use crate::types::{DecoderError, Result, RowTimestamp, SignalRow, SignalValue};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use csv::{StringRecord, StringRecordsIntoIter, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Rows read per chunk by [`parse_csv`]
pub const DEFAULT_CHUNK_ROWS: usize = 100_000;

const RAW_HEADER: [&str; 3] = ["timestamp", "sender", "value"];
const NORMALIZED_HEADER: [&str; 3] = ["sender", "value", "date_time"];

/// Base time that timestamp offsets are added to: 2025-01-01T00:00:00
pub fn reference_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// `timestamp, sender, value` with millisecond offsets
    Offsets,
    /// `sender, value, date_time` with ISO timestamps
    Normalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OffsetRadix {
    Decimal,
    Hex,
}

/// Chunked reader over a decoded CSV
pub struct TabularReader<R: Read> {
    records: StringRecordsIntoIter<R>,
    layout: Layout,
    /// First record, when it turned out to be data rather than a header
    pending: Option<StringRecord>,
    radix: Option<OffsetRadix>,
}

impl TabularReader<File> {
    /// Open a decoded CSV file
    ///
    /// `Ok(None)` means the file is empty or does not have three columns.
    pub fn from_path(path: &Path) -> Result<Option<Self>> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read> TabularReader<R> {
    pub fn new(input: R) -> Result<Option<Self>> {
        let mut records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(input)
            .into_records();

        let first = match records.next() {
            Some(record) => record?,
            None => return Ok(None),
        };
        if first.len() != 3 {
            return Ok(None);
        }

        let (layout, pending) = if is_header(&first, &RAW_HEADER) {
            (Layout::Offsets, None)
        } else if is_header(&first, &NORMALIZED_HEADER) {
            (Layout::Normalized, None)
        } else {
            (Layout::Offsets, Some(first))
        };

        Ok(Some(Self {
            records,
            layout,
            pending,
            radix: None,
        }))
    }

    /// Read up to `max_rows` rows; `Ok(None)` once the input is exhausted
    pub fn next_chunk(&mut self, max_rows: usize) -> Result<Option<Vec<SignalRow>>> {
        let mut rows = Vec::with_capacity(max_rows.min(DEFAULT_CHUNK_ROWS));

        while rows.len() < max_rows.max(1) {
            let record = match self.pending.take() {
                Some(record) => record,
                None => match self.records.next() {
                    Some(record) => record?,
                    None => break,
                },
            };
            rows.push(self.parse_record(&record)?);
        }

        Ok(if rows.is_empty() { None } else { Some(rows) })
    }

    fn parse_record(&mut self, record: &StringRecord) -> Result<SignalRow> {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() != 3 {
            return Err(DecoderError::InvalidData(format!(
                "line {}: expected 3 fields, found {}",
                line,
                record.len()
            )));
        }

        let (signal, value, timestamp) = match self.layout {
            Layout::Offsets => (&record[1], &record[2], self.parse_offset(&record[0], line)?),
            Layout::Normalized => (&record[0], &record[1], parse_iso(&record[2], line)?),
        };

        let value = SignalValue::parse(value).ok_or_else(|| {
            DecoderError::InvalidData(format!("line {}: invalid value {:?}", line, value))
        })?;

        Ok(SignalRow {
            timestamp: RowTimestamp::Absolute(timestamp),
            signal: signal.to_string(),
            value,
        })
    }

    fn parse_offset(&mut self, field: &str, line: u64) -> Result<NaiveDateTime> {
        let radix = *self.radix.get_or_insert(if field.contains('.') {
            OffsetRadix::Decimal
        } else {
            OffsetRadix::Hex
        });

        let millis = match radix {
            OffsetRadix::Decimal => field
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.trunc() as i64),
            OffsetRadix::Hex => i64::from_str_radix(field, 16).ok(),
        };

        millis
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|offset| reference_epoch().checked_add_signed(offset))
            .ok_or_else(|| {
                DecoderError::InvalidData(format!("line {}: invalid timestamp {:?}", line, field))
            })
    }
}

fn is_header(record: &StringRecord, names: &[&str; 3]) -> bool {
    record.iter().zip(names.iter()).all(|(field, name)| {
        field.eq_ignore_ascii_case(name)
            || (*name == "sender" && field.eq_ignore_ascii_case("signal"))
    })
}

fn parse_iso(field: &str, line: u64) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(field, "%Y-%m-%dT%H:%M:%S%.f").map_err(|e| {
        DecoderError::InvalidData(format!("line {}: invalid date_time {:?}: {}", line, field, e))
    })
}

/// Parse a decoded CSV file into rows with absolute timestamps
///
/// Returns `Ok(None)` for an empty file, a file without three columns, or a
/// file with no data rows. Malformed fields are errors.
pub fn parse_csv(path: &Path) -> Result<Option<Vec<SignalRow>>> {
    let Some(mut reader) = TabularReader::from_path(path)? else {
        log::warn!("Empty CSV file or missing required columns: {:?}", path);
        return Ok(None);
    };

    let mut rows = Vec::new();
    while let Some(chunk) = reader.next_chunk(DEFAULT_CHUNK_ROWS)? {
        rows.extend(chunk);
    }

    if rows.is_empty() {
        log::warn!("No data rows in CSV file: {:?}", path);
        return Ok(None);
    }

    log::debug!("Parsed {} rows from {:?}", rows.len(), path);
    Ok(Some(rows))
}

/// Serialize rows to CSV bytes
///
/// The header comes from the first row: `timestamp,sender,value` for
/// relative timestamps, `sender,value,date_time` for absolute ones. No rows
/// means no bytes at all, not a header-only file.
pub fn to_csv_bytes(rows: &[SignalRow]) -> Result<Vec<u8>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    match first.timestamp {
        RowTimestamp::Relative(_) => {
            writer.write_record(RAW_HEADER)?;
            for row in rows {
                writer.write_record([
                    row.timestamp.to_string(),
                    row.signal.clone(),
                    row.value.to_string(),
                ])?;
            }
        }
        RowTimestamp::Absolute(_) => {
            writer.write_record(NORMALIZED_HEADER)?;
            for row in rows {
                writer.write_record([
                    row.signal.clone(),
                    row.value.to_string(),
                    row.timestamp.to_string(),
                ])?;
            }
        }
    }

    writer
        .into_inner()
        .map_err(|e| DecoderError::IoError(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn at_millis(ms: i64) -> NaiveDateTime {
        reference_epoch() + TimeDelta::milliseconds(ms)
    }

    fn read_all(input: &str) -> Option<Vec<SignalRow>> {
        let mut reader = TabularReader::new(Cursor::new(input.to_string())).unwrap()?;
        let mut rows = Vec::new();
        while let Some(chunk) = reader.next_chunk(2).unwrap() {
            assert!(chunk.len() <= 2);
            rows.extend(chunk);
        }
        Some(rows)
    }

    fn write_temp(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_hex_offsets() {
        let rows = read_all("000000BB, Temp, 255\n000003E8, Speed, 12.5\n").unwrap();
        assert_eq!(
            rows,
            vec![
                SignalRow {
                    timestamp: RowTimestamp::Absolute(at_millis(0xBB)),
                    signal: "Temp".to_string(),
                    value: SignalValue::Integer(255),
                },
                SignalRow {
                    timestamp: RowTimestamp::Absolute(at_millis(1000)),
                    signal: "Speed".to_string(),
                    value: SignalValue::Float(12.5),
                },
            ]
        );
        assert_eq!(rows[0].timestamp.to_string(), "2025-01-01T00:00:00.187000");
    }

    #[test]
    fn test_decimal_offsets_truncate() {
        let rows = read_all("1500.9,Temp,1\n20,Temp,2\n").unwrap();
        assert_eq!(rows[0].timestamp, RowTimestamp::Absolute(at_millis(1500)));
        // Mode comes from the first row: "20" is decimal here
        assert_eq!(rows[1].timestamp, RowTimestamp::Absolute(at_millis(20)));
    }

    #[test]
    fn test_hex_mode_rejects_decimal_rows() {
        let mut reader = TabularReader::new(Cursor::new("0A,Temp,1\n0.5,Temp,2\n")).unwrap().unwrap();
        assert!(matches!(reader.next_chunk(10), Err(DecoderError::InvalidData(_))));
    }

    #[test]
    fn test_header_rows() {
        let rows = read_all("timestamp,sender,value\n0A,Temp,1\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, RowTimestamp::Absolute(at_millis(10)));

        let rows = read_all("sender,value,date_time\nTemp,1,2025-01-01T00:00:02.500000\n").unwrap();
        assert_eq!(rows[0].timestamp, RowTimestamp::Absolute(at_millis(2500)));
        assert_eq!(rows[0].signal, "Temp");
    }

    #[test]
    fn test_empty_and_invalid_inputs() {
        assert!(read_all("").is_none());
        assert!(read_all("a,b\n").is_none());

        let empty = write_temp(b"");
        assert_eq!(parse_csv(empty.path()).unwrap(), None);

        let header_only = write_temp(b"timestamp,sender,value\n");
        assert_eq!(parse_csv(header_only.path()).unwrap(), None);

        let two_columns = write_temp(b"0A,Temp\n");
        assert_eq!(parse_csv(two_columns.path()).unwrap(), None);
    }

    #[test]
    fn test_bad_value_is_error() {
        let file = write_temp(b"0A,Temp,hot\n");
        assert!(matches!(parse_csv(file.path()), Err(DecoderError::InvalidData(_))));
    }

    #[test]
    fn test_to_csv_bytes_empty() {
        assert!(to_csv_bytes(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_to_csv_bytes_relative() {
        let rows = vec![
            SignalRow::relative(0.01, "Temp", SignalValue::Integer(255)),
            SignalRow::relative(0.02, "Volt", SignalValue::Float(12.0)),
        ];
        let bytes = to_csv_bytes(&rows).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "timestamp,sender,value\n0.01,Temp,255\n0.02,Volt,12.0\n"
        );
    }

    #[test]
    fn test_absolute_round_trip() {
        let parsed = read_all("000000BB,Temp,255\n000001F4,Volt,12.25\n").unwrap();
        let bytes = to_csv_bytes(&parsed).unwrap();
        assert_eq!(
            String::from_utf8(bytes.clone()).unwrap(),
            "sender,value,date_time\n\
             Temp,255,2025-01-01T00:00:00.187000\n\
             Volt,12.25,2025-01-01T00:00:00.500000\n"
        );

        let file = write_temp(&bytes);
        assert_eq!(parse_csv(file.path()).unwrap(), Some(parsed));
    }
}
