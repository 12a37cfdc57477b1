//! Tabular data model exchanged between nodes
//!
//! A [`Table`] is an immutable sequence of [`Row`]s described by a
//! [`TableSpec`]. Tables are only produced through a [`TableBuilder`],
//! which enforces that every row has one cell per column and that every
//! non-null cell matches its column's declared type. Cells are never coerced.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// Shared handle to an immutable table
pub type TableRef = Arc<Table>;

/// Primitive type tag of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Text
    String,
    /// 64-bit float
    Number,
    /// Boolean
    Boolean,
    /// Nested record or array
    Json,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "json",
        }
    }

    /// Parse a type tag as written in settings ("string", "number", ...)
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Some(Self::String),
            "number" | "double" | "int" | "integer" | "float" => Some(Self::Number),
            "boolean" | "bool" => Some(Self::Boolean),
            "json" | "object" | "structured" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name and type of one column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered column layout of a table
///
/// Column order defines the cell index mapping of every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSpec {
    columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// Create a spec, rejecting duplicate column names
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(NodeError::configuration(format!(
                    "Duplicate column name '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Spec with no columns
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnSpec> {
        self.columns.get(index)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Index of the named column, if present
    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Index of the named column, or a configuration error naming it
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.find_column_index(name).ok_or_else(|| {
            NodeError::configuration(format!("Required column '{}' is missing", name))
        })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Value of a single cell
///
/// Serialized as the bare JSON value; [`Cell`] decodes it by its type tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Json(serde_json::Value),
}

/// Typed cell; `Null` values are permitted in any column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawCell")]
pub struct Cell {
    pub data_type: DataType,
    pub value: CellValue,
}

/// Wire form of a [`Cell`] before its value is decoded against the tag
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCell {
    data_type: DataType,
    #[serde(default)]
    value: serde_json::Value,
}

impl TryFrom<RawCell> for Cell {
    type Error = String;

    fn try_from(raw: RawCell) -> std::result::Result<Self, Self::Error> {
        Cell::from_json(raw.data_type, &raw.value)
            .ok_or_else(|| format!("value {} is not a valid {} cell", raw.value, raw.data_type))
    }
}

impl Cell {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: DataType::String,
            value: CellValue::String(value.into()),
        }
    }

    pub fn number(value: f64) -> Self {
        Self {
            data_type: DataType::Number,
            value: CellValue::Number(value),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            data_type: DataType::Boolean,
            value: CellValue::Boolean(value),
        }
    }

    /// JSON cell; a JSON `null` is stored as a missing cell
    pub fn json(value: serde_json::Value) -> Self {
        if value.is_null() {
            return Self::null(DataType::Json);
        }
        Self {
            data_type: DataType::Json,
            value: CellValue::Json(value),
        }
    }

    /// Missing cell for a column of the given type
    pub fn null(data_type: DataType) -> Self {
        Self {
            data_type,
            value: CellValue::Null,
        }
    }

    /// Build a cell of `data_type` from a JSON literal, without coercion.
    ///
    /// Returns `None` when the literal's JSON type does not fit the column.
    pub fn from_json(data_type: DataType, value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match (data_type, value) {
            (_, Value::Null) => Some(Self::null(data_type)),
            (DataType::String, Value::String(s)) => Some(Self::string(s.clone())),
            (DataType::Number, Value::Number(n)) => n.as_f64().map(Self::number),
            (DataType::Boolean, Value::Bool(b)) => Some(Self::boolean(*b)),
            (DataType::Json, other) => Some(Self::json(other.clone())),
            _ => None,
        }
    }

    /// Plain JSON rendering of the value
    pub fn to_json(&self) -> serde_json::Value {
        match &self.value {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Boolean(b) => serde_json::Value::Bool(*b),
            CellValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::String(s) => serde_json::Value::String(s.clone()),
            CellValue::Json(v) => v.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, CellValue::Null)
    }

    /// Null, or an empty string
    pub fn is_missing(&self) -> bool {
        match &self.value {
            CellValue::Null => true,
            CellValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.value {
            CellValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            CellValue::Boolean(b) => Some(b),
            _ => None,
        }
    }

    /// Type of the stored value; `None` for null
    fn value_type(&self) -> Option<DataType> {
        match self.value {
            CellValue::Null => None,
            CellValue::Boolean(_) => Some(DataType::Boolean),
            CellValue::Number(_) => Some(DataType::Number),
            CellValue::String(_) => Some(DataType::String),
            CellValue::Json(_) => Some(DataType::Json),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            CellValue::Null => f.write_str("?"),
            CellValue::Boolean(b) => write!(f, "{}", b),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::String(s) => f.write_str(s),
            CellValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// One row: an opaque key plus one cell per column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub key: String,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }
}

/// Immutable table produced by [`TableBuilder::close`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    spec: TableSpec,
    rows: Vec<Row>,
}

impl Table {
    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over the cells of one column
    pub fn column_cells(&self, index: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().filter_map(move |r| r.cells.get(index))
    }
}

/// Accumulates rows for a table with a fixed spec
#[derive(Debug)]
pub struct TableBuilder {
    spec: TableSpec,
    rows: Vec<Row>,
}

impl TableBuilder {
    pub fn new(spec: TableSpec) -> Self {
        Self {
            spec,
            rows: Vec::new(),
        }
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    /// Number of rows added so far
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, failing fast when its shape or cell types disagree with the table spec
    pub fn add_row(&mut self, key: impl Into<String>, cells: Vec<Cell>) -> Result<()> {
        let key = key.into();
        if cells.len() != self.spec.num_columns() {
            return Err(NodeError::ShapeMismatch {
                row_key: key,
                expected: self.spec.num_columns(),
                actual: cells.len(),
            });
        }
        for (cell, column) in cells.iter().zip(self.spec.columns()) {
            // The tag must name the column type, and a non-null value must carry that type
            let actual = match cell.value_type() {
                Some(value_type) if value_type != cell.data_type => value_type,
                _ => cell.data_type,
            };
            if actual != column.data_type {
                return Err(NodeError::CellType {
                    row_key: key,
                    column: column.name.clone(),
                    expected: column.data_type,
                    actual,
                });
            }
        }
        self.rows.push(Row { key, cells });
        Ok(())
    }

    /// Finish building
    pub fn close(self) -> Table {
        Table {
            spec: self.spec,
            rows: self.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people_spec() -> TableSpec {
        TableSpec::new(vec![
            ColumnSpec::new("Name", DataType::String),
            ColumnSpec::new("Age", DataType::Number),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = TableSpec::new(vec![
            ColumnSpec::new("a", DataType::String),
            ColumnSpec::new("a", DataType::Number),
        ]);
        assert!(matches!(result, Err(NodeError::Configuration(_))));
    }

    #[test]
    fn test_find_column_index() {
        let spec = people_spec();
        assert_eq!(spec.find_column_index("Age"), Some(1));
        assert_eq!(spec.find_column_index("Height"), None);
        assert!(spec.require_column("Height").is_err());
    }

    #[test]
    fn test_builder_produces_table() {
        let mut builder = TableBuilder::new(people_spec());
        builder
            .add_row("r0", vec![Cell::string("Ann"), Cell::number(30.0)])
            .unwrap();
        builder
            .add_row("r1", vec![Cell::string("Bo"), Cell::null(DataType::Number)])
            .unwrap();
        let table = builder.close();

        assert_eq!(table.size(), 2);
        assert_eq!(table.rows()[0].cells[0].as_str(), Some("Ann"));
        assert!(table.rows()[1].cells[1].is_missing());
    }

    #[test]
    fn test_builder_rejects_wrong_cell_count() {
        let mut builder = TableBuilder::new(people_spec());
        let err = builder.add_row("r0", vec![Cell::string("Ann")]).unwrap_err();
        assert!(matches!(
            err,
            NodeError::ShapeMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_builder_rejects_wrong_cell_type() {
        let mut builder = TableBuilder::new(people_spec());
        let err = builder
            .add_row("r0", vec![Cell::string("Ann"), Cell::string("thirty")])
            .unwrap_err();
        assert!(matches!(err, NodeError::CellType { .. }));
    }

    #[test]
    fn test_builder_checks_cell_tag() {
        let spec = TableSpec::new(vec![ColumnSpec::new("n", DataType::Number)]).unwrap();
        let mut builder = TableBuilder::new(spec);

        let mistagged = Cell {
            data_type: DataType::String,
            value: CellValue::Number(1.0),
        };
        assert!(matches!(
            builder.add_row("r0", vec![mistagged]),
            Err(NodeError::CellType {
                actual: DataType::String,
                ..
            })
        ));
        assert!(matches!(
            builder.add_row("r1", vec![Cell::null(DataType::Boolean)]),
            Err(NodeError::CellType {
                actual: DataType::Boolean,
                ..
            })
        ));

        let mislabeled = Cell {
            data_type: DataType::Number,
            value: CellValue::String("1".to_string()),
        };
        assert!(builder.add_row("r2", vec![mislabeled]).is_err());
        assert!(builder.is_empty());
    }

    #[test]
    fn test_json_cells_survive_serde() {
        let spec = TableSpec::new(vec![
            ColumnSpec::new("payload", DataType::Json),
            ColumnSpec::new("label", DataType::String),
        ])
        .unwrap();
        let mut builder = TableBuilder::new(spec.clone());
        let payloads = [
            serde_json::json!("text"),
            serde_json::json!(3.5),
            serde_json::json!(true),
            serde_json::json!({"a": [1, 2]}),
            serde_json::Value::Null,
        ];
        for (i, payload) in payloads.iter().enumerate() {
            builder
                .add_row(
                    format!("r{}", i),
                    vec![Cell::json(payload.clone()), Cell::string("x")],
                )
                .unwrap();
        }
        let table = builder.close();

        let json = serde_json::to_string(&table).unwrap();
        let back: Table = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
        assert_eq!(back.rows()[0].cells[0].value, CellValue::Json(serde_json::json!("text")));
        assert!(back.rows()[4].cells[0].is_null());

        let mut rebuilt = TableBuilder::new(spec);
        for row in back.rows() {
            rebuilt.add_row(row.key.clone(), row.cells.clone()).unwrap();
        }
        assert_eq!(rebuilt.len(), payloads.len());
    }

    #[test]
    fn test_cell_value_must_fit_tag() {
        let result: std::result::Result<Cell, _> =
            serde_json::from_value(serde_json::json!({"dataType": "number", "value": "30"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_cell_from_json_does_not_coerce() {
        let json = serde_json::json!("30");
        assert!(Cell::from_json(DataType::Number, &json).is_none());
        assert_eq!(
            Cell::from_json(DataType::Number, &serde_json::json!(30)),
            Some(Cell::number(30.0))
        );
        assert!(Cell::from_json(DataType::Boolean, &serde_json::Value::Null)
            .unwrap()
            .is_null());
    }

    #[test]
    fn test_empty_string_is_missing() {
        assert!(Cell::string("").is_missing());
        assert!(!Cell::string("a").is_missing());
        assert!(!Cell::number(0.0).is_missing());
    }

    #[test]
    fn test_data_type_parse() {
        assert_eq!(DataType::parse("Number"), Some(DataType::Number));
        assert_eq!(DataType::parse("string"), Some(DataType::String));
        assert_eq!(DataType::parse("blob"), None);
    }
}
