//! Row values and the column buffers they are appended to.

use crate::error::{Result, WriterError};
use arrow::array::{
    ArrayRef, BooleanBuilder, Int32Builder, Int64Builder, StringBuilder,
    TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

/// One cell of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Utf8(String),
    /// Milliseconds since the Unix epoch.
    TimestampMillis(i64),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Utf8(_) => "utf8",
            Value::TimestampMillis(_) => "timestamp[ms]",
        }
    }

    fn fits(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Bool(_), DataType::Boolean)
                | (Value::Int32(_), DataType::Int32)
                | (Value::Int64(_), DataType::Int64)
                | (Value::Utf8(_), DataType::Utf8)
                | (
                    Value::TimestampMillis(_),
                    DataType::Timestamp(TimeUnit::Millisecond, _)
                )
        )
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map(Value::Utf8).unwrap_or(Value::Null)
    }
}

impl From<Option<i32>> for Value {
    fn from(value: Option<i32>) -> Self {
        value.map(Value::Int32).unwrap_or(Value::Null)
    }
}

/// Ordered values, one per schema column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Vec<Value>);

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check arity, types and nullability against `schema`.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if self.0.len() != schema.fields().len() {
            return Err(WriterError::malformed_row(format!(
                "expected {} values, got {}",
                schema.fields().len(),
                self.0.len()
            )));
        }

        for (value, field) in self.0.iter().zip(schema.fields().iter()) {
            match value {
                Value::Null if !field.is_nullable() => {
                    return Err(WriterError::malformed_row(format!(
                        "null in non-nullable column '{}'",
                        field.name()
                    )));
                }
                Value::Null => {}
                v if !v.fits(field.data_type()) => {
                    return Err(WriterError::malformed_row(format!(
                        "column '{}' expects {}, got {}",
                        field.name(),
                        field.data_type(),
                        v.kind()
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Typed builder for one column.
pub(crate) enum ColumnBuffer {
    Bool(BooleanBuilder),
    Int32(Int32Builder),
    Int64(Int64Builder),
    Utf8(StringBuilder),
    TimestampMillis(TimestampMillisecondBuilder),
}

impl ColumnBuffer {
    pub(crate) fn for_field(field: &Field) -> Result<Self> {
        let buffer = match field.data_type() {
            DataType::Boolean => ColumnBuffer::Bool(BooleanBuilder::new()),
            DataType::Int32 => ColumnBuffer::Int32(Int32Builder::new()),
            DataType::Int64 => ColumnBuffer::Int64(Int64Builder::new()),
            DataType::Utf8 => ColumnBuffer::Utf8(StringBuilder::new()),
            dt @ DataType::Timestamp(TimeUnit::Millisecond, _) => ColumnBuffer::TimestampMillis(
                TimestampMillisecondBuilder::new().with_data_type(dt.clone()),
            ),
            other => {
                return Err(WriterError::unsupported_column(
                    field.name().as_str(),
                    other.clone(),
                ))
            }
        };
        Ok(buffer)
    }

    /// Append a value that already passed [`Row::validate`].
    pub(crate) fn append(&mut self, value: &Value) {
        match (self, value) {
            (ColumnBuffer::Bool(b), Value::Bool(v)) => b.append_value(*v),
            (ColumnBuffer::Int32(b), Value::Int32(v)) => b.append_value(*v),
            (ColumnBuffer::Int64(b), Value::Int64(v)) => b.append_value(*v),
            (ColumnBuffer::Utf8(b), Value::Utf8(v)) => b.append_value(v),
            (ColumnBuffer::TimestampMillis(b), Value::TimestampMillis(v)) => b.append_value(*v),
            (buffer, _) => buffer.append_null(),
        }
    }

    fn append_null(&mut self) {
        match self {
            ColumnBuffer::Bool(b) => b.append_null(),
            ColumnBuffer::Int32(b) => b.append_null(),
            ColumnBuffer::Int64(b) => b.append_null(),
            ColumnBuffer::Utf8(b) => b.append_null(),
            ColumnBuffer::TimestampMillis(b) => b.append_null(),
        }
    }

    pub(crate) fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuffer::Bool(b) => Arc::new(b.finish()),
            ColumnBuffer::Int32(b) => Arc::new(b.finish()),
            ColumnBuffer::Int64(b) => Arc::new(b.finish()),
            ColumnBuffer::Utf8(b) => Arc::new(b.finish()),
            ColumnBuffer::TimestampMillis(b) => Arc::new(b.finish()),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        use arrow::array::ArrayBuilder;

        match self {
            ColumnBuffer::Bool(b) => b.len(),
            ColumnBuffer::Int32(b) => b.len(),
            ColumnBuffer::Int64(b) => b.len(),
            ColumnBuffer::Utf8(b) => b.len(),
            ColumnBuffer::TimestampMillis(b) => b.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new(
                "time",
                DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
                false,
            ),
            Field::new("qname", DataType::Utf8, false),
            Field::new("len", DataType::Int32, true),
        ])
    }

    #[test]
    fn test_valid_row() {
        let row = Row::new(vec![
            Value::TimestampMillis(1_700_000_000_000),
            Value::Utf8("example.nl.".into()),
            Value::Null,
        ]);
        assert!(row.validate(&schema()).is_ok());
    }

    #[test]
    fn test_wrong_arity() {
        let row = Row::new(vec![Value::TimestampMillis(0)]);
        let err = row.validate(&schema()).unwrap_err();
        assert!(err.to_string().contains("expected 3 values, got 1"));
    }

    #[test]
    fn test_wrong_type() {
        let row = Row::new(vec![
            Value::TimestampMillis(0),
            Value::Int64(42),
            Value::Null,
        ]);
        let err = row.validate(&schema()).unwrap_err();
        assert!(err.to_string().contains("column 'qname'"));
    }

    #[test]
    fn test_null_in_required_column() {
        let row = Row::new(vec![Value::Null, Value::Utf8("a.".into()), Value::Int32(1)]);
        assert!(row.validate(&schema()).is_err());
    }

    #[test]
    fn test_column_buffer_roundtrip() {
        let field = Field::new("len", DataType::Int32, true);
        let mut buffer = ColumnBuffer::for_field(&field).unwrap();
        buffer.append(&Value::Int32(512));
        buffer.append(&Value::Null);
        assert_eq!(buffer.len(), 2);

        let array = buffer.finish();
        assert_eq!(array.len(), 2);
        assert_eq!(array.null_count(), 1);
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_unsupported_column() {
        let field = Field::new("payload", DataType::Binary, true);
        assert!(ColumnBuffer::for_field(&field).is_err());
    }
}
