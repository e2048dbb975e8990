//! Contact loading from spreadsheets and CSV files.
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::model::ContactRecord;

#[derive(Debug, Error)]
pub enum ContactsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("spreadsheet error: {0}")]
    Sheet(#[from] calamine::Error),
    #[error("spreadsheet has no worksheets")]
    NoSheet,
    #[error("contacts file must include columns: name, phone (missing: {0})")]
    MissingColumns(String),
}

/// Load contacts from `path`. `.csv` files go through the CSV reader, anything
/// else through the spreadsheet reader (first worksheet).
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<Vec<ContactRecord>, ContactsError> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    let rows = if is_csv {
        read_csv(path)?
    } else {
        read_sheet(path)?
    };
    let contacts = from_rows(rows)?;
    debug!(count = contacts.len(), "contacts loaded");
    Ok(contacts)
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, ContactsError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn read_sheet(path: &Path) -> Result<Vec<Vec<String>>, ContactsError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range_at(0).ok_or(ContactsError::NoSheet)??;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Render a spreadsheet cell as text. Integral floats lose their `.0` so phone
/// numbers stored as numbers survive.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// Build contacts from a header row followed by data rows.
pub fn from_rows(rows: Vec<Vec<String>>) -> Result<Vec<ContactRecord>, ContactsError> {
    let mut rows = rows.into_iter();
    let header: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let column = |name: &str| header.iter().position(|h| h == name);

    let (name_col, phone_col) = match (column("name"), column("phone")) {
        (Some(n), Some(p)) => (n, p),
        (n, p) => {
            let missing: Vec<&str> = [("name", n), ("phone", p)]
                .into_iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(label, _)| label)
                .collect();
            return Err(ContactsError::MissingColumns(missing.join(", ")));
        }
    };
    let message_col = column("message");

    let cell = |row: &[String], idx: usize| row.get(idx).map(|s| s.trim().to_string()).unwrap_or_default();

    Ok(rows
        .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
        .map(|row| ContactRecord {
            name: cell(row.as_slice(), name_col),
            phone: cell(row.as_slice(), phone_col),
            custom_message: message_col
                .map(|idx| cell(row.as_slice(), idx))
                .filter(|m| !m.is_empty()),
        })
        .collect())
}

/// Strip `+` and whitespace; the rest must be a non-empty run of ASCII digits.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| *c != '+' && !c.is_whitespace())
        .collect();
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}
