use crate::crs::Crs;
use crate::error::{GisError, Result};
use geo::{BoundingRect, Geometry, Rect};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A single attribute cell.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

static NULL_VALUE: AttributeValue = AttributeValue::Null;

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Bool(_) => Some(FieldKind::Logical),
            AttributeValue::Integer(_) | AttributeValue::Float(_) => Some(FieldKind::Numeric),
            AttributeValue::Text(_) => Some(FieldKind::Text),
        }
    }

    /// Equality used by attribute filters: numbers compare by value, text
    /// ignores the trailing padding dBase fields carry.
    pub fn matches(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a.trim_end() == b.trim_end(),
            (AttributeValue::Bool(a), AttributeValue::Bool(b)) => a == b,
            (AttributeValue::Null, AttributeValue::Null) => true,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Text,
    Logical,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Numeric => "numeric",
            FieldKind::Text => "text",
            FieldKind::Logical => "logical",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A resolved column: position in the record plus its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef {
    pub index: usize,
    pub kind: FieldKind,
}

/// Ordered attribute schema shared by every record of a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Resolve a column by exact name.
    pub fn column(&self, name: &str) -> Result<ColumnRef> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|index| ColumnRef {
                index,
                kind: self.fields[index].kind,
            })
            .ok_or_else(|| GisError::ColumnNotFound {
                column: name.to_string(),
                available: self.names(),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub geometry: Geometry<f64>,
    // Positionally aligned with the dataset schema
    pub values: Vec<AttributeValue>,
}

impl Record {
    pub fn new(geometry: Geometry<f64>, values: Vec<AttributeValue>) -> Self {
        Self { geometry, values }
    }

    pub fn value(&self, column: ColumnRef) -> &AttributeValue {
        self.values.get(column.index).unwrap_or(&NULL_VALUE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
    Collection,
}

impl GeometryKind {
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryKind::Point,
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                GeometryKind::Line
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => GeometryKind::Polygon,
            Geometry::GeometryCollection(_) => GeometryKind::Collection,
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeometryKind::Point => "point",
            GeometryKind::Line => "line",
            GeometryKind::Polygon => "polygon",
            GeometryKind::Collection => "collection",
        };
        write!(f, "{name}")
    }
}

/// Records with geometry and attributes, tagged with a CRS.
///
/// Datasets are immutable: reprojection and filtering derive new ones.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    schema: Arc<Schema>,
    records: Vec<Record>,
    crs: Option<Crs>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, schema: Schema, records: Vec<Record>, crs: Option<Crs>) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
            records,
            crs,
        }
    }

    /// Same name and schema, new records and CRS.
    pub(crate) fn derive(&self, records: Vec<Record>, crs: Option<Crs>) -> Self {
        Self {
            name: self.name.clone(),
            schema: Arc::clone(&self.schema),
            records,
            crs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn geometry_kinds(&self) -> Vec<GeometryKind> {
        self.records
            .iter()
            .map(|r| GeometryKind::of(&r.geometry))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Union of all record bounding boxes.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.records
            .iter()
            .filter_map(|r| r.geometry.bounding_rect())
            .reduce(union_rect)
    }

    /// Values of one column, resolved through the schema.
    pub fn column_values(&self, name: &str) -> Result<impl Iterator<Item = &AttributeValue> + '_> {
        let column = self.schema.column(name)?;
        Ok(self.records.iter().map(move |r| r.value(column)))
    }

    /// Records satisfying `predicate`, as a new dataset with the same schema and CRS.
    pub fn filter<F>(&self, predicate: F) -> Dataset
    where
        F: Fn(&Record) -> bool,
    {
        let records = self.records.iter().filter(|r| predicate(r)).cloned().collect();
        self.derive(records, self.crs.clone())
    }

    /// Records whose `column` matches `value`. An absent value yields an empty dataset.
    pub fn filter_eq(&self, column: &str, value: &AttributeValue) -> Result<Dataset> {
        let column = self.schema.column(column)?;
        Ok(self.filter(|r| r.value(column).matches(value)))
    }
}

pub(crate) fn union_rect(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}
