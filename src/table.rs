//! The editable output table and its spreadsheet export.
//!
//! Rows are [`Record`]s in aggregation order. Columns are `No` followed by
//! the twelve record fields in [`Field::ALL`] order, headed by their
//! Indonesian labels so the sheet matches the clinic's paper register.
//! Tables export to `.xlsx` (one `DataPasien` sheet) or CSV.

use crate::error::ExtractError;
use crate::record::{Field, Record, RecordId, ID_LABEL};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Worksheet name used for `.xlsx` exports.
pub const SHEET_NAME: &str = "DataPasien";

/// In-memory table a reviewer can correct before exporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    rows: Vec<Record>,
}

impl RecordTable {
    pub fn from_records(rows: Vec<Record>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_records(self) -> Vec<Record> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header row: `No` then every field label.
    pub fn header() -> Vec<&'static str> {
        std::iter::once(ID_LABEL)
            .chain(Field::ALL.iter().map(|f| f.label()))
            .collect()
    }

    /// Overwrite one cell (0-based row). `None` clears it.
    pub fn set_cell(&mut self, row: usize, field: Field, value: Option<String>) -> Result<(), ExtractError> {
        let len = self.rows.len();
        let record = self
            .rows
            .get_mut(row)
            .ok_or(ExtractError::RowOutOfRange { row, len })?;
        record.set(field, value);
        Ok(())
    }

    /// Append a row numbered after the last one.
    pub fn push_row(&mut self, mut record: Record) {
        record.no = Some(RecordId::from(self.rows.len() + 1));
        self.rows.push(record);
    }

    /// Delete a row (0-based) and renumber the rest `1..=N`.
    pub fn remove_row(&mut self, row: usize) -> Result<Record, ExtractError> {
        if row >= self.rows.len() {
            return Err(ExtractError::RowOutOfRange {
                row,
                len: self.rows.len(),
            });
        }
        let removed = self.rows.remove(row);
        for (i, record) in self.rows.iter_mut().enumerate() {
            record.no = Some(RecordId::from(i + 1));
        }
        Ok(removed)
    }

    /// Write the table as CSV. Missing values are empty cells.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(Self::header())?;
        for record in &self.rows {
            wtr.write_record(cells(record))?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Render the table as an `.xlsx` workbook with a bold header row.
    /// Missing values are left blank.
    pub fn to_xlsx_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;

        for (col, label) in Self::header().into_iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, label, &bold)?;
        }
        for (row, record) in self.rows.iter().enumerate() {
            for (col, cell) in cells(record).enumerate() {
                if !cell.is_empty() {
                    sheet.write_string(row as u32 + 1, col as u16, &cell)?;
                }
            }
        }
        workbook.save_to_buffer()
    }

    /// Export to a file, as `.xlsx` when the extension says so and CSV
    /// otherwise.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), ExtractError> {
        let path = path.as_ref();
        let is_xlsx = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
        if is_xlsx {
            self.export_xlsx(path)
        } else {
            self.export_csv(path)
        }
    }

    /// Export to a CSV file.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<(), ExtractError> {
        self.export_with(path.as_ref(), "csv.tmp", |table, file| {
            table.write_csv(file).map_err(|e| e.to_string())
        })
    }

    /// Export to an `.xlsx` workbook.
    pub fn export_xlsx(&self, path: impl AsRef<Path>) -> Result<(), ExtractError> {
        self.export_with(path.as_ref(), "xlsx.tmp", |table, mut file| {
            let bytes = table.to_xlsx_bytes().map_err(|e| e.to_string())?;
            file.write_all(&bytes).map_err(|e| e.to_string())
        })
    }

    /// Atomic write (temp file + rename): a failed export never leaves a
    /// truncated sheet behind.
    fn export_with(
        &self,
        path: &Path,
        tmp_extension: &str,
        write: impl FnOnce(&Self, File) -> Result<(), String>,
    ) -> Result<(), ExtractError> {
        let export_failed = |detail: String| ExtractError::ExportFailed {
            path: path.to_path_buf(),
            detail,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| export_failed(e.to_string()))?;
        }

        let tmp_path = path.with_extension(tmp_extension);
        let file = File::create(&tmp_path).map_err(|e| export_failed(e.to_string()))?;
        if let Err(detail) = write(self, file) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(export_failed(detail));
        }
        std::fs::rename(&tmp_path, path).map_err(|e| export_failed(e.to_string()))?;

        info!("Exported {} row(s) to {}", self.rows.len(), path.display());
        Ok(())
    }

    /// Rows as a pretty JSON array keyed by column label.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.rows)
    }
}

/// One exported row: the record number, then every field in column order.
fn cells(record: &Record) -> impl Iterator<Item = String> + '_ {
    let no = record.no.as_ref().map(ToString::to_string).unwrap_or_default();
    std::iter::once(no).chain(
        Field::ALL
            .iter()
            .map(|f| record.get(*f).unwrap_or_default().to_string()),
    )
}

impl From<Vec<Record>> for RecordTable {
    fn from(rows: Vec<Record>) -> Self {
        Self::from_records(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RecordTable {
        let mut t = RecordTable::default();
        t.push_row(Record {
            name: Some("SRI".into()),
            address: Some("PIJILAN RT 4A, JAMBANAN, SIDOHARJO, SRAGEN".into()),
            ..Default::default()
        });
        t.push_row(Record {
            name: Some("TONO".into()),
            diagnosis: Some("adem panas".into()),
            ..Default::default()
        });
        t
    }

    #[test]
    fn header_starts_with_no() {
        let header = RecordTable::header();
        assert_eq!(header.len(), 13);
        assert_eq!(header[0], "No");
        assert_eq!(header[1], Field::ALL[0].label());
    }

    #[test]
    fn csv_quotes_commas_and_leaves_gaps_empty() {
        let mut buf = Vec::new();
        table().write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("No,Nama Pasien,"));
        assert!(lines[1].starts_with("1,SRI,\"PIJILAN RT 4A, JAMBANAN, SIDOHARJO, SRAGEN\","));
        assert!(lines[2].starts_with("2,TONO,,"));
    }

    #[test]
    fn edit_cells_and_rows() {
        let mut t = table();
        t.set_cell(1, Field::Diagnosis, Some("demam".into())).unwrap();
        assert_eq!(t.rows()[1].diagnosis.as_deref(), Some("demam"));

        t.set_cell(0, Field::Address, None).unwrap();
        assert_eq!(t.rows()[0].address, None);

        let err = t.set_cell(5, Field::Name, None).unwrap_err();
        assert!(matches!(err, ExtractError::RowOutOfRange { row: 5, len: 2 }));

        let removed = t.remove_row(0).unwrap();
        assert_eq!(removed.name.as_deref(), Some("SRI"));
        assert_eq!(t.rows()[0].no, Some(RecordId::Number(1)));
        assert!(t.remove_row(3).is_err());
    }

    #[test]
    fn export_writes_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/pasien.csv");
        table().export_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("TONO"));
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn xlsx_export_has_one_patient_sheet() {
        use calamine::{open_workbook, Reader, Xlsx};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DataPasien.xlsx");
        table().export(&path).unwrap();
        assert!(!path.with_extension("xlsx.tmp").exists());

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec![SHEET_NAME.to_string()]);
        let range = workbook.worksheet_range(SHEET_NAME).unwrap();
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "No");
        assert_eq!(rows[0][1], "Nama Pasien");
        assert_eq!(rows[1][..3], ["1", "SRI", "PIJILAN RT 4A, JAMBANAN, SIDOHARJO, SRAGEN"]);
        assert_eq!(rows[2][1], "TONO");
        assert_eq!(rows[2][2], "");
    }

    #[test]
    fn export_picks_csv_for_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pasien.txt");
        table().export(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("No,Nama Pasien,"));
    }

    #[test]
    fn json_uses_column_labels() {
        let json = table().to_json().unwrap();
        assert!(json.contains("\"Nama Pasien\": \"SRI\""));
    }
}
