//! Datasets, schemas and attributes
//!
//! A [`Dataset`] pairs a privacy [`Schema`] (attribute types with declared
//! bounds) with Arrow storage. Bounds come from the schema, never from the
//! data: reading them off the data would leak the extremes of individual
//! records into every budgeted query.

mod value;

pub use value::Value;

use crate::config::SamplerConfig;
use crate::expr::Expression;
use crate::sampler::Sampler;
use crate::storage::StorageEngine;
use crate::{Error, Result};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, LargeStringArray, StringArray, UInt16Array, UInt32Array, UInt8Array,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Privacy-relevant type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeType {
    /// Integer column with declared bounds
    Integer {
        /// Declared lower bound
        min: i64,
        /// Declared upper bound
        max: i64,
    },
    /// Floating point column with declared bounds
    Float {
        /// Declared lower bound
        min: f64,
        /// Declared upper bound
        max: f64,
    },
    /// String-valued column
    Categorical,
    /// Boolean column
    Boolean,
}

impl AttributeType {
    /// Sensitivity (`max - min`) of the attribute, `None` for categorical data
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sensitivity(&self) -> Option<f64> {
        match *self {
            Self::Integer { min, max } => Some(max as f64 - min as f64),
            Self::Float { min, max } => Some(max - min),
            Self::Boolean => Some(1.0),
            Self::Categorical => None,
        }
    }

    /// Declared numeric bounds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn bounds(&self) -> Option<(f64, f64)> {
        match *self {
            Self::Integer { min, max } => Some((min as f64, max as f64)),
            Self::Float { min, max } => Some((min, max)),
            Self::Boolean => Some((0.0, 1.0)),
            Self::Categorical => None,
        }
    }

    /// Check whether an Arrow column type can back this attribute
    #[must_use]
    pub const fn accepts(&self, data_type: &DataType) -> bool {
        match self {
            Self::Integer { .. } => matches!(
                data_type,
                DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
            ),
            Self::Float { .. } => matches!(data_type, DataType::Float32 | DataType::Float64),
            Self::Categorical => matches!(data_type, DataType::Utf8 | DataType::LargeUtf8),
            Self::Boolean => matches!(data_type, DataType::Boolean),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Integer { .. } => "integer",
            Self::Float { .. } => "float",
            Self::Categorical => "categorical",
            Self::Boolean => "boolean",
        }
    }
}

/// A named attribute declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Column name
    pub name: String,
    /// Declared type
    #[serde(flatten)]
    pub kind: AttributeType,
}

/// Ordered set of attribute declarations
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    attributes: Vec<AttributeSpec>,
}

impl Schema {
    /// Create a schema from attribute declarations
    ///
    /// # Errors
    /// Returns error if a name repeats or numeric bounds are inverted
    pub fn new(attributes: Vec<AttributeSpec>) -> Result<Self> {
        let mut seen = HashSet::new();
        for spec in &attributes {
            if !seen.insert(spec.name.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Duplicate attribute name: {}",
                    spec.name
                )));
            }
            if let Some((min, max)) = spec.kind.bounds() {
                if min.is_nan() || max.is_nan() || min > max {
                    return Err(Error::InvalidInput(format!(
                        "Invalid bounds for attribute '{}': [{min}, {max}]",
                        spec.name
                    )));
                }
            }
        }
        Ok(Self { attributes })
    }

    /// Start a schema builder
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Attribute declarations in order
    #[must_use]
    pub fn attributes(&self) -> &[AttributeSpec] {
        &self.attributes
    }

    /// Look up a declaration by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|spec| spec.name == name)
    }

    /// Number of attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check for an empty schema
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Builder for [`Schema`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    attributes: Vec<AttributeSpec>,
}

impl SchemaBuilder {
    /// Add an attribute of any type
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeType) -> Self {
        self.attributes.push(AttributeSpec {
            name: name.into(),
            kind,
        });
        self
    }

    /// Add a bounded integer attribute
    #[must_use]
    pub fn integer(self, name: impl Into<String>, min: i64, max: i64) -> Self {
        self.attribute(name, AttributeType::Integer { min, max })
    }

    /// Add a bounded float attribute
    #[must_use]
    pub fn float(self, name: impl Into<String>, min: f64, max: f64) -> Self {
        self.attribute(name, AttributeType::Float { min, max })
    }

    /// Add a categorical attribute
    #[must_use]
    pub fn categorical(self, name: impl Into<String>) -> Self {
        self.attribute(name, AttributeType::Categorical)
    }

    /// Add a boolean attribute
    #[must_use]
    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.attribute(name, AttributeType::Boolean)
    }

    /// Build the schema
    ///
    /// # Errors
    /// Returns error if a name repeats or numeric bounds are inverted
    pub fn build(self) -> Result<Schema> {
        Schema::new(self.attributes)
    }
}

/// Tabular dataset: privacy schema plus Arrow storage
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: Schema,
    storage: StorageEngine,
}

impl Dataset {
    /// Create a dataset, checking every schema attribute against the stored columns
    ///
    /// # Errors
    /// Returns `DatasetTypeMismatch` if a column has an incompatible Arrow type
    /// and `UnknownAttribute` if a declared column is missing
    pub fn new(schema: Schema, storage: StorageEngine) -> Result<Self> {
        if let Some(arrow_schema) = storage.schema() {
            for spec in schema.attributes() {
                let field = arrow_schema
                    .field_with_name(&spec.name)
                    .map_err(|_| Error::UnknownAttribute(spec.name.clone()))?;
                if !spec.kind.accepts(field.data_type()) {
                    return Err(Error::DatasetTypeMismatch {
                        attribute: spec.name.clone(),
                        expected: spec.kind.label().to_string(),
                        found: format!("{:?}", field.data_type()),
                    });
                }
            }
        }
        Ok(Self { schema, storage })
    }

    /// Create a dataset from in-memory record batches
    ///
    /// # Errors
    /// Returns error if the batches disagree on schema or do not match `schema`
    pub fn from_batches(schema: Schema, batches: Vec<RecordBatch>) -> Result<Self> {
        Self::new(schema, StorageEngine::new(batches)?)
    }

    /// Load a dataset from a Parquet file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or does not match `schema`
    pub fn load_parquet<P: AsRef<Path>>(schema: Schema, path: P) -> Result<Self> {
        Self::new(schema, StorageEngine::load_parquet(path)?)
    }

    /// Privacy schema
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Underlying storage
    #[must_use]
    pub const fn storage(&self) -> &StorageEngine {
        &self.storage
    }

    /// Number of records
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.storage.num_rows()
    }

    /// Record-count expression
    #[must_use]
    pub const fn len(&self) -> Expression<'_> {
        Expression::Length(self)
    }

    /// Check for a dataset without records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Look up an attribute by name
    ///
    /// # Errors
    /// Returns `UnknownAttribute` if the schema does not declare `name`
    pub fn attribute(&self, name: &str) -> Result<Attribute<'_>> {
        let spec = self
            .schema
            .get(name)
            .ok_or_else(|| Error::UnknownAttribute(name.to_string()))?;
        Ok(Attribute {
            dataset: self,
            spec,
        })
    }

    /// Read one column as values
    ///
    /// # Errors
    /// Returns error if the attribute is unknown or a chunk cannot be decoded
    pub fn column_values(&self, name: &str) -> Result<Vec<Value>> {
        let spec = self
            .schema
            .get(name)
            .ok_or_else(|| Error::UnknownAttribute(name.to_string()))?;
        if self.storage.schema().is_none() {
            return Ok(Vec::new());
        }

        let mut values = Vec::with_capacity(self.num_rows());
        for chunk in self.storage.column_chunks(name)? {
            append_values(&mut values, &chunk, spec)?;
        }
        Ok(values)
    }

    /// Draw a synthetic sample: discretize, randomize at `config.epsilon`,
    /// then traverse attribute combinations
    ///
    /// # Errors
    /// See [`crate::sampler::randomized_sample`]
    pub fn randomized_sample<R: Rng>(&self, config: &SamplerConfig, rng: &mut R) -> Result<Sampler> {
        crate::sampler::randomized_sample(self, config, rng)
    }
}

/// A typed column reference into a [`Dataset`]
#[derive(Debug, Clone, Copy)]
pub struct Attribute<'a> {
    dataset: &'a Dataset,
    spec: &'a AttributeSpec,
}

impl<'a> Attribute<'a> {
    /// Attribute name
    #[must_use]
    pub fn name(&self) -> &'a str {
        &self.spec.name
    }

    /// Declared type
    #[must_use]
    pub const fn kind(&self) -> &'a AttributeType {
        &self.spec.kind
    }

    /// Owning dataset
    #[must_use]
    pub const fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    /// Sensitivity (`max - min` of the declared bounds)
    ///
    /// # Errors
    /// Returns `DatasetTypeMismatch` for categorical attributes
    pub fn sensitivity(&self) -> Result<f64> {
        self.spec
            .kind
            .sensitivity()
            .ok_or_else(|| Error::DatasetTypeMismatch {
                attribute: self.spec.name.clone(),
                expected: "numeric or boolean".to_string(),
                found: self.spec.kind.label().to_string(),
            })
    }

    /// Column values as stored
    ///
    /// # Errors
    /// Returns error if the column cannot be read
    pub fn values(&self) -> Result<Vec<Value>> {
        self.dataset.column_values(&self.spec.name)
    }

    /// Column expression
    #[must_use]
    pub const fn expr(self) -> Expression<'a> {
        Expression::Column(self)
    }

    /// Record-count expression over the owning dataset
    #[must_use]
    pub const fn len(self) -> Expression<'a> {
        Expression::Length(self.dataset)
    }

    /// Sum expression
    #[must_use]
    pub const fn sum(self) -> Expression<'a> {
        Expression::Sum(self)
    }

    /// Mean expression
    #[must_use]
    pub const fn mean(self) -> Expression<'a> {
        Expression::Mean(self)
    }
}

macro_rules! append_primitive {
    ($out:expr, $chunk:expr, $array_ty:ty, $convert:expr) => {{
        let array = $chunk
            .as_any()
            .downcast_ref::<$array_ty>()
            .ok_or_else(|| {
                Error::Other(format!("Failed to downcast to {}", stringify!($array_ty)))
            })?;
        $out.extend(array.iter().map(|v| v.map_or(Value::Null, $convert)));
    }};
}

fn append_values(out: &mut Vec<Value>, chunk: &ArrayRef, spec: &AttributeSpec) -> Result<()> {
    match chunk.data_type() {
        DataType::Int8 => append_primitive!(out, chunk, Int8Array, |v| Value::Int(i64::from(v))),
        DataType::Int16 => append_primitive!(out, chunk, Int16Array, |v| Value::Int(i64::from(v))),
        DataType::Int32 => append_primitive!(out, chunk, Int32Array, |v| Value::Int(i64::from(v))),
        DataType::Int64 => append_primitive!(out, chunk, Int64Array, Value::Int),
        DataType::UInt8 => append_primitive!(out, chunk, UInt8Array, |v| Value::Int(i64::from(v))),
        DataType::UInt16 => {
            append_primitive!(out, chunk, UInt16Array, |v| Value::Int(i64::from(v)));
        }
        DataType::UInt32 => {
            append_primitive!(out, chunk, UInt32Array, |v| Value::Int(i64::from(v)));
        }
        DataType::Float32 => {
            append_primitive!(out, chunk, Float32Array, |v| Value::Float(f64::from(v)));
        }
        DataType::Float64 => append_primitive!(out, chunk, Float64Array, Value::Float),
        DataType::Boolean => append_primitive!(out, chunk, BooleanArray, Value::Bool),
        DataType::Utf8 => {
            append_primitive!(out, chunk, StringArray, |v: &str| Value::from(v));
        }
        DataType::LargeUtf8 => {
            append_primitive!(out, chunk, LargeStringArray, |v: &str| Value::from(v));
        }
        dt => {
            return Err(Error::DatasetTypeMismatch {
                attribute: spec.name.clone(),
                expected: spec.kind.label().to_string(),
                found: format!("{dt:?}"),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, Schema as ArrowSchema};
    use std::sync::Arc;

    fn people_batch() -> RecordBatch {
        let schema = ArrowSchema::new(vec![
            Field::new("age", DataType::Int32, true),
            Field::new("city", DataType::Utf8, false),
            Field::new("employed", DataType::Boolean, false),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from(vec![Some(31), None, Some(58)])),
                Arc::new(StringArray::from(vec!["A", "B", "A"])),
                Arc::new(BooleanArray::from(vec![true, false, true])),
            ],
        )
        .unwrap()
    }

    fn people_schema() -> Schema {
        Schema::builder()
            .integer("age", 0, 100)
            .categorical("city")
            .boolean("employed")
            .build()
            .unwrap()
    }

    #[test]
    fn test_sensitivity_is_bound_range() {
        let dataset = Dataset::from_batches(people_schema(), vec![people_batch()]).unwrap();
        let age = dataset.attribute("age").unwrap();
        assert!((age.sensitivity().unwrap() - 100.0).abs() < f64::EPSILON);
        let employed = dataset.attribute("employed").unwrap();
        assert!((employed.sensitivity().unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_categorical_sensitivity_is_type_mismatch() {
        let dataset = Dataset::from_batches(people_schema(), vec![people_batch()]).unwrap();
        let result = dataset.attribute("city").unwrap().sensitivity();
        assert!(matches!(result, Err(Error::DatasetTypeMismatch { .. })));
    }

    #[test]
    fn test_column_values_with_nulls() {
        let dataset = Dataset::from_batches(people_schema(), vec![people_batch()]).unwrap();
        assert_eq!(
            dataset.column_values("age").unwrap(),
            vec![Value::Int(31), Value::Null, Value::Int(58)]
        );
        assert_eq!(
            dataset.column_values("city").unwrap(),
            vec![Value::from("A"), Value::from("B"), Value::from("A")]
        );
    }

    #[test]
    fn test_schema_type_mismatch_rejected() {
        let schema = Schema::builder().float("city", 0.0, 1.0).build().unwrap();
        let result = Dataset::from_batches(schema, vec![people_batch()]);
        assert!(matches!(
            result,
            Err(Error::DatasetTypeMismatch { attribute, .. }) if attribute == "city"
        ));
    }

    #[test]
    fn test_missing_column_rejected() {
        let schema = Schema::builder().categorical("country").build().unwrap();
        let result = Dataset::from_batches(schema, vec![people_batch()]);
        assert!(matches!(result, Err(Error::UnknownAttribute(name)) if name == "country"));
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let result = Schema::builder().categorical("a").boolean("a").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let result = Schema::builder().integer("age", 10, 0).build();
        assert!(result.unwrap_err().to_string().contains("Invalid bounds"));
    }

    #[test]
    fn test_unknown_attribute_lookup() {
        let dataset = Dataset::from_batches(people_schema(), vec![people_batch()]).unwrap();
        assert!(matches!(
            dataset.attribute("zip"),
            Err(Error::UnknownAttribute(_))
        ));
    }

    #[test]
    fn test_schema_serde_shape() {
        let schema: Schema = serde_json::from_str(
            r#"{"attributes": [
                {"name": "age", "type": "integer", "min": 0, "max": 100},
                {"name": "city", "type": "categorical"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(schema, Schema::builder().integer("age", 0, 100).categorical("city").build().unwrap());
    }
}
