//! Tabular snapshot model.
//!
//! A [`Snapshot`] is the full dataset handed to the engine: ordered rows over
//! named columns. Cells are loosely typed because the upstream export mixes
//! native values, missing values and JSON encoded as text in the same column.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A single cell of the snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Object(Map<String, Value>),
    List(Vec<Value>),
}

static NULL_CELL: Cell = Cell::Null;

impl Cell {
    /// True for `Null` and for floating point NaN, the two ways the export
    /// encodes a missing value.
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Float(f) => f.is_nan(),
            _ => false,
        }
    }
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => n.as_f64().map(Cell::Float).unwrap_or(Cell::Null),
            },
            Value::String(s) => Cell::Text(s),
            Value::Array(items) => Cell::List(items),
            Value::Object(map) => Cell::Object(map),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<DateTime<Utc>> for Cell {
    fn from(value: DateTime<Utc>) -> Self {
        Cell::Timestamp(value)
    }
}

/// The complete dataset: named columns and ordered rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Cell>>,
}

impl Snapshot {
    /// Create an empty snapshot with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut snapshot = Self::default();
        for column in columns {
            snapshot.add_column(column.into());
        }
        snapshot
    }

    /// Build a snapshot from JSON objects, one per row.
    ///
    /// Columns are the union of all keys in first-seen order. Keys missing
    /// from a row read as [`Cell::Null`].
    pub fn from_json_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Map<String, Value>>,
    {
        let mut snapshot = Self::default();
        for row in rows {
            let mut cells = vec![Cell::Null; snapshot.columns.len()];
            for (key, value) in row {
                let idx = match snapshot.index.get(&key) {
                    Some(&idx) => idx,
                    None => snapshot.add_column(key),
                };
                if idx >= cells.len() {
                    cells.resize(idx + 1, Cell::Null);
                }
                cells[idx] = Cell::from(value);
            }
            snapshot.rows.push(cells);
        }
        snapshot
    }

    fn add_column(&mut self, name: String) -> usize {
        if let Some(&idx) = self.index.get(&name) {
            return idx;
        }
        let idx = self.columns.len();
        self.index.insert(name.clone(), idx);
        self.columns.push(name);
        idx
    }

    /// Append a row. Short rows are padded with nulls, extra cells dropped.
    pub fn push_row(&mut self, mut cells: Vec<Cell>) {
        cells.resize(self.columns.len(), Cell::Null);
        self.rows.push(cells);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get a row view by position.
    pub fn row(&self, idx: usize) -> Option<Row<'_>> {
        self.rows.get(idx).map(|cells| Row {
            snapshot: self,
            cells,
        })
    }

    /// Iterate rows in order.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row {
            snapshot: self,
            cells,
        })
    }
}

/// Borrowed view of one snapshot row with lookup by column name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    snapshot: &'a Snapshot,
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    /// Cell for `column`, or [`Cell::Null`] if the column does not exist.
    pub fn get(&self, column: &str) -> &'a Cell {
        self.snapshot
            .index
            .get(column)
            .and_then(|&idx| self.cells.get(idx))
            .unwrap_or(&NULL_CELL)
    }

    /// Iterate `(column, cell)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Cell)> {
        self.snapshot
            .columns
            .iter()
            .map(String::as_str)
            .zip(self.cells.iter())
    }
}
