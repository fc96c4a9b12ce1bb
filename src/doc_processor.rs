use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDateTime, SecondsFormat};
use csv::{ByteRecord, ReaderBuilder};

use crate::store::models::Attachment;

/// Default upload limit: 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];
const SNIFF_RECORDS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("The selected file is empty. Please choose a valid file.")]
    EmptyFile,
    #[error("File exceeds the {limit} byte limit ({size} bytes). Please choose a smaller file.")]
    TooLarge { size: u64, limit: u64 },
    #[error("The file must have a valid extension (.csv, .xlsx or .xls)")]
    MissingExtension,
    #[error("Unsupported file type .{0}. Please upload a CSV or Excel file (.csv, .xlsx, .xls)")]
    UnsupportedExtension(String),
    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to parse CSV: the file is empty or contains no valid data")]
    EmptyCsv,
    #[error("failed to parse CSV: quoted field opened on line {line} is never closed")]
    UnclosedQuote { line: u64 },
    #[error("failed to parse spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("failed to parse spreadsheet: the workbook contains no worksheets")]
    NoWorksheets,
    #[error("failed to parse spreadsheet: the first worksheet contains no data")]
    EmptyWorksheet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Spreadsheet,
}

impl FileKind {
    /// Classify a file by its (case-insensitive) extension.
    pub fn from_name(name: &str) -> Result<Self, AttachmentError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or(AttachmentError::MissingExtension)?;

        match ext.as_str() {
            "csv" => Ok(FileKind::Csv),
            "xlsx" | "xls" => Ok(FileKind::Spreadsheet),
            _ => Err(AttachmentError::UnsupportedExtension(ext)),
        }
    }
}

/// Validate an upload before reading it: size limit first, then extension.
pub fn check_upload(name: &str, size: u64, max_bytes: u64) -> Result<FileKind, AttachmentError> {
    if size > max_bytes {
        return Err(AttachmentError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    FileKind::from_name(name)
}

/// Parse an uploaded CSV or Excel file into an [`Attachment`].
pub fn parse_file(name: &str, mime_type: &str, bytes: &[u8]) -> Result<Attachment, AttachmentError> {
    if bytes.is_empty() {
        return Err(AttachmentError::EmptyFile);
    }

    let rows = match FileKind::from_name(name)? {
        FileKind::Csv => parse_csv(bytes)?,
        FileKind::Spreadsheet => parse_spreadsheet(bytes)?,
    };

    log::debug!("Parsed {} into {} rows", name, rows.len());
    Ok(Attachment::new(name, mime_type, rows))
}

/// Cells that are not valid UTF-8 are decoded lossily rather than rejected.
fn parse_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, AttachmentError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let delimiter = sniff_delimiter(bytes);
    if let Some(line) = unclosed_quote_line(bytes, delimiter) {
        return Err(AttachmentError::UnclosedQuote { line });
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        if is_blank(&record) {
            continue;
        }
        rows.push(
            record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).trim().to_string())
                .collect(),
        );
    }

    if is_empty_table(&rows) {
        return Err(AttachmentError::EmptyCsv);
    }
    Ok(rows)
}

/// Pick the delimiter giving the widest consistent field count over the first
/// few records. Falls back to a comma.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let mut best = (b',', 1);
    for delimiter in DELIMITERS {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(bytes);

        let counts: Vec<usize> = reader
            .byte_records()
            .map_while(Result::ok)
            .filter(|r| !(r.len() == 1 && r[0].iter().all(u8::is_ascii_whitespace)))
            .take(SNIFF_RECORDS)
            .map(|r| r.len())
            .collect();

        let Some(&width) = counts.first() else {
            continue;
        };
        if width > best.1 && counts.iter().all(|&c| c == width) {
            best = (delimiter, width);
        }
    }
    best.0
}

/// Line on which a quoted field opens without a closing quote, if any.
///
/// The `csv` reader accepts such input and folds the rest of the file into
/// one cell, so this is checked up front.
fn unclosed_quote_line(bytes: &[u8], delimiter: u8) -> Option<u64> {
    let mut line = 1;
    let mut open_since = None;
    let mut at_field_start = true;
    let mut iter = bytes.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        if open_since.is_some() {
            if byte == b'"' {
                // "" is an escaped quote inside a quoted field
                if iter.peek() == Some(&b'"') {
                    iter.next();
                } else {
                    open_since = None;
                }
            }
        } else {
            if byte == b'"' && at_field_start {
                open_since = Some(line);
            }
            at_field_start = byte == delimiter || byte == b'\n' || byte == b'\r';
        }
        if byte == b'\n' {
            line += 1;
        }
    }
    open_since
}

fn is_blank(record: &ByteRecord) -> bool {
    record.len() == 1 && record[0].iter().all(u8::is_ascii_whitespace)
}

fn is_empty_table(rows: &[Vec<String>]) -> bool {
    match rows {
        [] => true,
        [only] => only.len() == 1 && only[0].is_empty(),
        _ => false,
    }
}

fn parse_spreadsheet(bytes: &[u8]) -> Result<Vec<Vec<String>>, AttachmentError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(AttachmentError::NoWorksheets)??;

    // Empty cells are dropped, so sparse rows collapse toward the left.
    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| {
            row.iter()
                .filter(|cell| !matches!(cell, Data::Empty))
                .map(cell_text)
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    if rows.is_empty() {
        return Err(AttachmentError::EmptyWorksheet);
    }
    Ok(rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => to_iso8601(naive),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(iso) => iso.clone(),
        other => other.to_string().trim().to_string(),
    }
}

fn to_iso8601(naive: NaiveDateTime) -> String {
    naive.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::PREVIEW_ROWS;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    fn csv(text: &str) -> Attachment {
        parse_file("data.csv", "text/csv", text.as_bytes()).unwrap()
    }

    fn rows(table: &[&[&str]]) -> Vec<Vec<String>> {
        table
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_csv_basic() {
        let parsed = csv("a,b\n1,2\n3,4");
        let expected = rows(&[&["a", "b"], &["1", "2"], &["3", "4"]]);
        assert_eq!(parsed.content(), expected.as_slice());
        assert_eq!(parsed.preview(), parsed.content());
        assert_eq!(parsed.name(), "data.csv");
        assert_eq!(parsed.mime_type(), "text/csv");
    }

    #[test]
    fn test_csv_trims_and_skips_blank_lines() {
        let parsed = csv(" name , qty \r\n\r\n apple ,  3\n   \npear,4\n");
        let expected = rows(&[&["name", "qty"], &["apple", "3"], &["pear", "4"]]);
        assert_eq!(parsed.content(), expected.as_slice());
    }

    #[test]
    fn test_csv_keeps_ragged_rows() {
        let parsed = csv("a,b,c\n1\n2,3");
        assert_eq!(parsed.content()[1], vec!["1"]);
        assert_eq!(parsed.content()[2], vec!["2", "3"]);
    }

    #[test]
    fn test_csv_quoted_fields_and_bom() {
        let parsed = parse_file(
            "quoted.csv",
            "",
            b"\xEF\xBB\xBFcity,note\n\"Paris, FR\",\"say \"\"hi\"\"\"",
        )
        .unwrap();
        assert_eq!(parsed.content()[0], vec!["city", "note"]);
        assert_eq!(parsed.content()[1], vec!["Paris, FR", "say \"hi\""]);
    }

    #[test]
    fn test_csv_detects_semicolon_and_tab() {
        let parsed = csv("a;b;c\n1;2;3");
        assert_eq!(parsed.content()[1], vec!["1", "2", "3"]);

        let parsed = csv("a\tb\n1\t2");
        assert_eq!(parsed.content()[0], vec!["a", "b"]);
    }

    #[test]
    fn test_csv_single_column() {
        let parsed = csv("total\n10\n20");
        assert_eq!(parsed.content().len(), 3);
        assert_eq!(parsed.content()[2], vec!["20"]);
    }

    #[test]
    fn test_preview_truncates_to_six_rows() {
        let text: String = (0..20).map(|i| format!("{i},{}\n", i * 2)).collect();
        let parsed = csv(&text);
        assert_eq!(parsed.content().len(), 20);
        assert_eq!(parsed.preview().len(), PREVIEW_ROWS);
        assert_eq!(parsed.preview(), &parsed.content()[..6]);
        assert_eq!(parsed.data_row_count(), 19);
        assert_eq!(parsed.header().unwrap(), ["0", "0"]);
    }

    #[test]
    fn test_row_count_matches_non_blank_lines() {
        let text = "h1,h2\n\nx,1\n  \ny,2\nz,3\n";
        let non_blank = text.lines().filter(|l| !l.trim().is_empty()).count();
        let parsed = csv(text);
        assert_eq!(parsed.content().len(), non_blank);
        assert!(parsed
            .content()
            .iter()
            .flatten()
            .all(|cell| cell.trim() == cell));
    }

    #[test]
    fn test_empty_file_rejected_for_every_extension() {
        for name in ["a.csv", "a.xlsx", "a.xls"] {
            let err = parse_file(name, "", b"").unwrap_err();
            assert!(matches!(err, AttachmentError::EmptyFile), "{name}: {err}");
        }
    }

    #[test]
    fn test_whitespace_only_csv_is_empty() {
        let err = parse_file("blank.csv", "", b"  \n\n \n").unwrap_err();
        assert!(matches!(err, AttachmentError::EmptyCsv));
    }

    #[test]
    fn test_extension_checks() {
        let err = parse_file("notes.txt", "", b"a,b").unwrap_err();
        assert!(matches!(err, AttachmentError::UnsupportedExtension(ref e) if e == "txt"));

        let err = parse_file("README", "", b"a,b").unwrap_err();
        assert!(matches!(err, AttachmentError::MissingExtension));

        let parsed = parse_file("DATA.CSV", "", b"a,b").unwrap();
        assert_eq!(parsed.content()[0], vec!["a", "b"]);
    }

    #[test]
    fn test_non_utf8_csv_is_decoded_lossily() {
        // Windows-1252 export: 0xF1 is "ñ"
        let parsed = parse_file("es.csv", "", b"a\xF1o,total\nma\xF1ana,3").unwrap();
        assert_eq!(parsed.content()[0], vec!["a\u{FFFD}o", "total"]);
        assert_eq!(parsed.content()[1], vec!["ma\u{FFFD}ana", "3"]);
    }

    #[test]
    fn test_csv_malformed_quoting_is_rejected() {
        let err = parse_file("bad.csv", "", b"a,b\n\"1,2\n3,4\n5,6").unwrap_err();
        assert!(matches!(err, AttachmentError::UnclosedQuote { line: 2 }), "{err}");
        assert!(err.to_string().starts_with("failed to parse CSV"));

        let err = parse_file("tail.csv", "", b"a,b\n1,\"open").unwrap_err();
        assert!(matches!(err, AttachmentError::UnclosedQuote { line: 2 }), "{err}");
    }

    #[test]
    fn test_csv_quoted_newline_and_stray_quote_are_accepted() {
        let parsed = csv("note,n\n\"two\nlines\",1\n5\" disk,2");
        assert_eq!(parsed.content().len(), 3);
        assert_eq!(parsed.content()[1], vec!["two\nlines", "1"]);
        assert_eq!(parsed.content()[2], vec!["5\" disk", "2"]);
    }

    #[test]
    fn test_check_upload() {
        assert_eq!(
            check_upload("a.xlsx", 1024, MAX_UPLOAD_BYTES).unwrap(),
            FileKind::Spreadsheet
        );
        let err = check_upload("a.csv", MAX_UPLOAD_BYTES + 1, MAX_UPLOAD_BYTES).unwrap_err();
        assert!(matches!(err, AttachmentError::TooLarge { .. }));
        let err = check_upload("a.pdf", 10, MAX_UPLOAD_BYTES).unwrap_err();
        assert!(matches!(err, AttachmentError::UnsupportedExtension(_)));
    }

    #[test]
    fn test_xlsx_collapses_sparse_rows_and_formats_dates() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, " date ").unwrap();
        sheet.write_string(0, 1, "amount").unwrap();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let date = ExcelDateTime::from_ymd(2024, 1, 15).unwrap();
        sheet.write_datetime_with_format(1, 0, &date, &date_format).unwrap();
        sheet.write_number(1, 1, 42.0).unwrap();
        // Row 2 left empty on purpose; row 3 only fills columns A and C.
        sheet.write_string(3, 0, "left").unwrap();
        sheet.write_number(3, 2, 3.5).unwrap();
        sheet.write_boolean(4, 1, true).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let parsed = parse_file("book.xlsx", "", &bytes).unwrap();
        let expected = rows(&[
            &["date", "amount"],
            &["2024-01-15T00:00:00.000Z", "42"],
            &["left", "3.5"],
            &["true"],
        ]);
        assert_eq!(parsed.content(), expected.as_slice());
        assert_eq!(parsed.preview(), parsed.content());
    }

    #[test]
    fn test_legacy_biff_xls_loads() {
        let bytes = include_bytes!("../tests/fixtures/legacy.xls");
        let parsed = parse_file("legacy.xls", "application/vnd.ms-excel", bytes).unwrap();
        let expected = rows(&[&["city", "total"], &["Lima", "42"]]);
        assert_eq!(parsed.content(), expected.as_slice());
    }

    #[test]
    fn test_xls_extension_loads_xlsx_bytes() {
        let mut workbook = Workbook::new();
        workbook.add_worksheet().write_string(0, 0, "only").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let parsed = parse_file("legacy.xls", "", &bytes).unwrap();
        assert_eq!(parsed.content(), rows(&[&["only"]]).as_slice());
    }

    #[test]
    fn test_xlsx_uses_first_worksheet_only() {
        let mut workbook = Workbook::new();
        workbook.add_worksheet().write_string(0, 0, "first").unwrap();
        workbook.add_worksheet().write_string(0, 0, "second").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let parsed = parse_file("two.xlsx", "", &bytes).unwrap();
        assert_eq!(parsed.content(), rows(&[&["first"]]).as_slice());
    }

    #[test]
    fn test_empty_worksheet_rejected() {
        let mut workbook = Workbook::new();
        workbook.add_worksheet();
        let bytes = workbook.save_to_buffer().unwrap();

        let err = parse_file("empty.xlsx", "", &bytes).unwrap_err();
        assert!(matches!(err, AttachmentError::EmptyWorksheet));
    }

    #[test]
    fn test_corrupt_spreadsheet_is_wrapped() {
        let err = parse_file("broken.xlsx", "", b"definitely not a workbook").unwrap_err();
        assert!(matches!(err, AttachmentError::Spreadsheet(_)));
        assert!(err.to_string().starts_with("failed to parse spreadsheet"));
    }
}
