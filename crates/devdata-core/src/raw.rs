//! Source-native tables, before harmonization.
//!
//! Every format parser (CSV, Excel, JSON, PDF text) produces a [`RawTable`]:
//! a header plus rows of loosely typed [`Cell`]s. The harmonizer turns it into
//! an Arrow `RecordBatch`.

use std::io::Cursor;

use calamine::{Data, Reader};

/// One source-native value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

/// Strings that sources use for "no value".
const NULL_SENTINELS: &[&str] = &["", "..", "...", "-", "--", "n/a", "na", "nan", "null", "none"];

pub fn is_null_sentinel(s: &str) -> bool {
    let s = s.trim();
    NULL_SENTINELS.iter().any(|n| s.eq_ignore_ascii_case(n))
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(s)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(n) => n.is_nan(),
            Self::Bool(_) => false,
        }
    }

    /// Trimmed string form; `None` for empty cells.
    pub fn as_str(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Self::Number(n) if n.is_nan() => None,
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Self::Number(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
        }
    }

    /// Numeric value; text is parsed after removing thousands separators.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) if !is_null_sentinel(s) => {
                let cleaned: String = s.trim().chars().filter(|c| *c != ',' && *c != ' ').collect();
                cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            Self::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|n| n.fract() == 0.0).map(|n| n as i64))
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) => Some(*n != 0.0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" | "1" | "x" => Some(true),
                "no" | "n" | "false" | "0" => Some(false),
                _ => None,
            },
            Self::Empty => None,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::text(s.as_str()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.as_str()),
            Data::Error(_) => Cell::Empty,
        }
    }
}

impl From<&serde_json::Value> for Cell {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Cell::Empty,
            serde_json::Value::Bool(b) => Cell::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Cell::Empty, Cell::Number),
            serde_json::Value::String(s) => Cell::text(s.as_str()),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// Header plus rows. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl RawTable {
    /// Build from columns and rows; short rows are padded, long rows truncated.
    pub fn new(columns: Vec<String>, mut rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        for row in &mut rows {
            row.resize(width, Cell::Empty);
        }
        Self { columns, rows }
    }

    /// Parse delimited text. The first record is the header.
    pub fn from_csv(text: &str, delimiter: u8) -> Result<Self, String> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(text.as_bytes());
        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| format!("unreadable header: {e}"))?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();
        if columns.iter().all(|c| c.is_empty()) {
            return Err("empty header".to_string());
        }

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| format!("record {}: {e}", line + 2))?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            rows.push(record.iter().map(Cell::text).collect());
        }
        Ok(Self::new(columns, rows))
    }

    /// Sheet from an in-memory workbook (xlsx, xls, ods). The first non-empty
    /// row is the header.
    pub fn from_workbook(bytes: &[u8], sheet: &str) -> Result<Self, String> {
        Self::read_sheet(bytes, Some(sheet))
    }

    /// First sheet of an in-memory workbook.
    pub fn from_first_sheet(bytes: &[u8]) -> Result<Self, String> {
        Self::read_sheet(bytes, None)
    }

    fn read_sheet(bytes: &[u8], sheet: Option<&str>) -> Result<Self, String> {
        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| format!("cannot open workbook: {e}"))?;
        let sheet = match sheet {
            Some(name) => name.to_string(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| "workbook has no sheets".to_string())?,
        };
        let sheet = sheet.as_str();
        let range = workbook
            .worksheet_range(sheet)
            .map_err(|e| format!("sheet '{sheet}': {e}"))?;

        let mut rows = range
            .rows()
            .map(|r| r.iter().map(Cell::from).collect::<Vec<_>>())
            .skip_while(|r| r.iter().all(Cell::is_empty));
        let header = rows.next().ok_or_else(|| format!("sheet '{sheet}' is empty"))?;
        let columns = header
            .iter()
            .map(|c| c.as_str().unwrap_or_default())
            .collect();
        let rows = rows.filter(|r| !r.iter().all(Cell::is_empty)).collect();
        Ok(Self::new(columns, rows))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column position, matching case-insensitively on trimmed names.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.columns
            .iter()
            .position(|c| c.trim().eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[Cell]) -> bool) {
        self.rows.retain(|r| keep(r));
    }

    /// Wide-to-long reshape.
    ///
    /// `id_vars` are kept on every output row; each remaining column becomes
    /// one row per input row with its header in `var_name` and its cell in
    /// `value_name`. Empty values are skipped.
    pub fn melt(&self, id_vars: &[&str], var_name: &str, value_name: &str) -> Result<Self, String> {
        let id_idx = id_vars
            .iter()
            .map(|v| {
                self.column_index(v)
                    .ok_or_else(|| format!("missing column '{v}'"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let value_idx: Vec<usize> = (0..self.columns.len())
            .filter(|i| !id_idx.contains(i))
            .collect();

        let mut columns: Vec<String> = id_idx.iter().map(|&i| self.columns[i].clone()).collect();
        columns.push(var_name.to_string());
        columns.push(value_name.to_string());

        let mut rows = Vec::with_capacity(self.rows.len() * value_idx.len());
        for row in &self.rows {
            for &vi in &value_idx {
                if row[vi].is_empty() {
                    continue;
                }
                let mut out: Vec<Cell> = id_idx.iter().map(|&i| row[i].clone()).collect();
                out.push(Cell::Text(self.columns[vi].clone()));
                out.push(row[vi].clone());
                rows.push(out);
            }
        }
        Ok(Self { columns, rows })
    }
}

/// Decode a text payload: UTF-8 (with or without BOM), UTF-16 with BOM, or Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => decode_latin1(bytes),
    }
}

/// ISO-8859-1: every byte is the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
