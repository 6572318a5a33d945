//! Tabular exchange format.
//!
//! Sheets travel as JSON: either a bare array of row objects, or a workbook
//! document `{"sheets":[{"name":"..","rows":[{..}]}]}`. Readers only look at
//! the first sheet.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IngestError;

/// One raw cell. Spreadsheet exports yield numbers (date serials, counters),
/// booleans (checkbox columns) and text.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    /// Text form used by the field parsers. Whole numbers drop the fraction.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }

    fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(CellValue::Bool(b)),
            serde_json::Value::Number(n) => n.as_f64().map(CellValue::Number),
            serde_json::Value::String(s) => Some(CellValue::Text(s)),
            other => Some(CellValue::Text(other.to_string())),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Number(n) => serializer.serialize_f64(*n),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Column label to cell mapping, in column order. Null cells are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.cells.push((label.into(), value.into()));
        self
    }

    /// Cell under `label`, matched on the trimmed label ignoring ASCII case.
    pub fn get(&self, label: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(l, _)| l.trim().eq_ignore_ascii_case(label))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(l, v)| (l.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: Into<CellValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (label, value) in &self.cells {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping column labels to cells")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Row, A::Error> {
                let mut row = Row::new();
                while let Some((label, value)) = map.next_entry::<String, serde_json::Value>()? {
                    if let Some(cell) = CellValue::from_json(value) {
                        row.cells.push((label, cell));
                    }
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// A named sheet of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Workbook {
    sheets: Vec<Sheet>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Rows(Vec<Row>),
    Workbook(Workbook),
}

/// Turns uploaded bytes into rows (first sheet only).
pub trait TabularReader {
    fn parse_rows(&self, bytes: &[u8]) -> Result<Vec<Row>, IngestError>;
}

/// Renders sheets into downloadable bytes.
pub trait TabularWriter {
    fn render(&self, sheets: &[Sheet]) -> Result<Vec<u8>, IngestError>;
}

/// JSON sheet reader/writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTabular;

impl TabularReader for JsonTabular {
    fn parse_rows(&self, bytes: &[u8]) -> Result<Vec<Row>, IngestError> {
        let document: Document = serde_json::from_slice(bytes).map_err(|e| {
            IngestError::Format(format!(
                "expected an array of rows or a {{\"sheets\": [..]}} document ({e})"
            ))
        })?;
        Ok(match document {
            Document::Rows(rows) => rows,
            Document::Workbook(book) => book.sheets.into_iter().next().map(|s| s.rows).unwrap_or_default(),
        })
    }
}

impl TabularWriter for JsonTabular {
    fn render(&self, sheets: &[Sheet]) -> Result<Vec<u8>, IngestError> {
        let book = Workbook {
            sheets: sheets.to_vec(),
        };
        Ok(serde_json::to_vec_pretty(&book)?)
    }
}
