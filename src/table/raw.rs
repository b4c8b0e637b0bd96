//! Untyped tabular input as delivered by a data source.

use crate::error::{Result, ScoreError};
use csv::StringRecord;
use flate2::read::GzDecoder;
use std::io::{Cursor, Read};
use zip::ZipArchive;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Header row plus string records, before any role is assigned to a column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<StringRecord>,
}

impl RawTable {
    /// Decodes CSV bytes. Gzip streams are gunzipped first; for a zip
    /// archive the first entry is read.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(&GZIP_MAGIC) {
            Self::from_reader(GzDecoder::new(bytes))
        } else if bytes.starts_with(&ZIP_MAGIC) {
            let mut archive = ZipArchive::new(Cursor::new(bytes))?;
            let entry = archive.by_index(0)?;
            Self::from_reader(entry)
        } else {
            Self::from_reader(bytes)
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let mut records = Vec::new();
        for result in rdr.records() {
            records.push(result?);
        }

        Ok(Self { headers, records })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose `column` equals `value`, as a new table.
    pub fn filter_eq(&self, column: &str, value: &str) -> Result<Self> {
        let idx = self
            .column_index(column)
            .ok_or_else(|| ScoreError::MissingColumn {
                role: "filter",
                column: column.to_string(),
            })?;

        Ok(Self {
            headers: self.headers.clone(),
            records: self
                .records
                .iter()
                .filter(|r| r.get(idx) == Some(value))
                .cloned()
                .collect(),
        })
    }

    /// Stacks tables sharing the same header row.
    pub fn concat(tables: Vec<RawTable>) -> Result<Self> {
        let mut iter = tables.into_iter();
        let Some(mut out) = iter.next() else {
            return Ok(Self::default());
        };

        for table in iter {
            if table.headers != out.headers {
                return Err(ScoreError::InvalidValue {
                    row: 0,
                    column: table.headers.join(","),
                    reason: format!("header row differs from '{}'", out.headers.join(",")),
                });
            }
            out.records.extend(table.records);
        }

        Ok(out)
    }
}
