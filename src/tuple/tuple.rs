use bytes::Bytes;

use crate::common::{RecordId, SlotId, INVALID_PAGE_ID};

use super::{Schema, Value};

/// A tuple is an immutable byte payload interpreted through a schema:
/// a null bitmap followed by the serialized columns in schema order.
/// The payload is shared cheaply (`Bytes`) between executors, sort runs
/// and undo logs.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    rid: RecordId,
    data: Bytes,
}

impl Tuple {
    /// Serializes values into a fresh tuple. Panics when a value does not
    /// fit its column; the planner is responsible for shapes.
    pub fn new(values: &[Value], schema: &Schema) -> Tuple {
        assert_eq!(values.len(), schema.column_count());

        let mut data = vec![0u8; schema.null_bitmap_size()];
        for (i, value) in values.iter().enumerate() {
            if value.is_null() {
                data[i / 8] |= 1 << (i % 8);
            }
            let col = schema.column(i);
            let bytes = value
                .serialize(&col.data_type())
                .unwrap_or_else(|| panic!("value {value} does not fit column {}", col.name()));
            data.extend_from_slice(&bytes);
        }

        Tuple {
            rid: RecordId::new(INVALID_PAGE_ID, SlotId::new(0)),
            data: Bytes::from(data),
        }
    }

    /// Wraps raw page bytes that already carry the tuple layout.
    pub fn from_bytes(rid: RecordId, data: Bytes) -> Tuple {
        Tuple { rid, data }
    }

    pub fn rid(&self) -> RecordId {
        self.rid
    }

    pub fn set_rid(&mut self, rid: RecordId) {
        self.rid = rid;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn is_column_null(&self, index: usize) -> bool {
        self.data[index / 8] & (1 << (index % 8)) != 0
    }

    /// Extracts one column value.
    pub fn value(&self, schema: &Schema, index: usize) -> Value {
        assert!(index < schema.column_count());

        let mut offset = schema.null_bitmap_size();
        for i in 0..index {
            offset += self.column_width(schema, i, offset);
        }

        if self.is_column_null(index) {
            return Value::Null;
        }
        let (value, _) = Value::deserialize(&self.data[offset..], &schema.column(index).data_type())
            .expect("tuple bytes shorter than its schema");
        value
    }

    /// Extracts every column value in schema order.
    pub fn values(&self, schema: &Schema) -> Vec<Value> {
        let mut out = Vec::with_capacity(schema.column_count());
        let mut offset = schema.null_bitmap_size();
        for i in 0..schema.column_count() {
            let width = self.column_width(schema, i, offset);
            if self.is_column_null(i) {
                out.push(Value::Null);
            } else {
                let (value, _) =
                    Value::deserialize(&self.data[offset..], &schema.column(i).data_type())
                        .expect("tuple bytes shorter than its schema");
                out.push(value);
            }
            offset += width;
        }
        out
    }

    /// Builds an index key tuple by projecting the key attributes.
    pub fn key_from_tuple(&self, schema: &Schema, key_schema: &Schema, key_attrs: &[usize]) -> Tuple {
        let values: Vec<Value> = key_attrs.iter().map(|&i| self.value(schema, i)).collect();
        Tuple::new(&values, key_schema)
    }

    pub fn to_display(&self, schema: &Schema) -> String {
        let rendered: Vec<String> = self
            .values(schema)
            .iter()
            .map(|v| v.to_string())
            .collect();
        format!("({})", rendered.join(", "))
    }

    fn column_width(&self, schema: &Schema, index: usize, offset: usize) -> usize {
        match schema.column(index).fixed_size() {
            Some(size) => size,
            None => {
                let len =
                    u16::from_le_bytes(self.data[offset..offset + 2].try_into().unwrap()) as usize;
                2 + len
            }
        }
    }
}
