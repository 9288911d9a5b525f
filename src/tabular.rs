use crate::prelude::*;
use csv::{ReaderBuilder, WriterBuilder};
use std::io::{Read, Write};

/// Reads a metadata table from delimited text
///
/// The first column holds the sample id; every remaining column becomes a
/// metadata attribute. Defaults to tab-separated input.
pub struct MetadataReaderBuilder {
    delimiter: u8,
}

impl MetadataReaderBuilder {
    pub fn new() -> Self {
        Self { delimiter: b'\t' }
    }

    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    pub fn from_reader<R: Read>(&self, reader: R) -> Result<Metadata, HullError> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        if headers.is_empty() {
            return Err(HullError::Format(
                "metadata requires a sample id column".into(),
            ));
        }
        let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut ids = Vec::new();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let mut fields = record.iter();
            let id = fields
                .next()
                .ok_or_else(|| HullError::Format("empty record in metadata".into()))?;
            ids.push(id.to_string());
            rows.push(fields.map(str::to_string).collect());
        }
        Metadata::new(ids, columns, rows)
    }
}

/// Reads a tab-separated metadata table.
pub fn read_metadata<R: Read>(reader: R) -> Result<Metadata, HullError> {
    MetadataReaderBuilder::new().from_reader(reader)
}

/// Writes a hulls table as tab-separated text: a header row with the
/// subject column name, `convexhull_volume` and `convexhull_area`, then one
/// record per individual.
pub fn write_hulls<W: Write>(table: &ResultTable, writer: W) -> Result<(), HullError> {
    let mut wtr = WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    wtr.write_record(table.columns())?;
    for record in table.records() {
        let volume = record.volume.to_string();
        let area = record.area.to_string();
        wtr.write_record([record.subject.as_str(), volume.as_str(), area.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads a hulls table back, validating its shape: exactly three columns,
/// the second named `convexhull_volume`, the third `convexhull_area`, and
/// float-valued measure cells.
pub fn read_hulls<R: Read>(reader: R) -> Result<ResultTable, HullError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.len() != 3 {
        return Err(HullError::Format(format!(
            "expected three columns, found {}",
            headers.len()
        )));
    }
    if &headers[1] != VOLUME_COLUMN {
        return Err(HullError::Format(format!(
            "the second column should be '{}', found '{}'",
            VOLUME_COLUMN, &headers[1]
        )));
    }
    if &headers[2] != AREA_COLUMN {
        return Err(HullError::Format(format!(
            "the third column should be '{}', found '{}'",
            AREA_COLUMN, &headers[2]
        )));
    }
    let subject_column = headers[0].to_string();

    let mut records = Hulls::new();
    for record in rdr.records() {
        let record = record?;
        let volume: f64 = record[1]
            .trim()
            .parse()
            .map_err(|_| HullError::Format(format!("non-float volume '{}'", &record[1])))?;
        let area: f64 = record[2]
            .trim()
            .parse()
            .map_err(|_| HullError::Format(format!("non-float area '{}'", &record[2])))?;
        records.push(HullRecord {
            subject: record[0].to_string(),
            volume,
            area,
        });
    }
    Ok(ResultTable::new(subject_column, records))
}
