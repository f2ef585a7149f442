use std::collections::HashMap;
use std::sync::Arc;

use super::DataType;

/// A single column in a table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    data_type: DataType,
    /// Column position in the schema (0-indexed)
    ordinal: usize,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            ordinal: 0, // set by Schema
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn fixed_size(&self) -> Option<usize> {
        self.data_type.fixed_size()
    }
}

/// The schema of a table or of an operator's output.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
    name_to_index: HashMap<String, usize>,
    /// Total size of the fixed-length columns
    fixed_size: usize,
    variable_count: usize,
    null_bitmap_size: usize,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        let mut columns = columns;
        let mut name_to_index = HashMap::new();
        let mut fixed_size = 0;
        let mut variable_count = 0;

        for (i, col) in columns.iter_mut().enumerate() {
            col.ordinal = i;
            name_to_index.insert(col.name.clone(), i);
            if let Some(size) = col.fixed_size() {
                fixed_size += size;
            } else {
                variable_count += 1;
            }
        }

        let null_bitmap_size = columns.len().div_ceil(8);

        Self {
            columns,
            name_to_index,
            fixed_size,
            variable_count,
            null_bitmap_size,
        }
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Projects a schema onto the given column indices, in order.
    pub fn copy_schema(schema: &Schema, attrs: &[usize]) -> Schema {
        let columns = attrs
            .iter()
            .map(|&i| schema.columns[i].clone())
            .collect::<Vec<_>>();
        Schema::new(columns)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn fixed_size(&self) -> usize {
        self.fixed_size
    }

    pub fn variable_count(&self) -> usize {
        self.variable_count
    }

    pub fn null_bitmap_size(&self) -> usize {
        self.null_bitmap_size
    }

    /// Byte length of every tuple of this schema, when all columns are
    /// fixed-width; variable-width schemas have no single storage size.
    pub fn storage_size(&self) -> Option<usize> {
        (self.variable_count == 0).then_some(self.null_bitmap_size + self.fixed_size)
    }

    /// Concatenates two schemas, as join outputs do.
    pub fn join_of(left: &Schema, right: &Schema) -> Schema {
        let mut columns: Vec<Column> = left.columns.clone();
        for col in &right.columns {
            let mut col = col.clone();
            // Disambiguate duplicated names with the ordinal suffix trick.
            if left.name_to_index.contains_key(&col.name) {
                col.name = format!("{}_r", col.name);
            }
            columns.push(col);
        }
        Schema::new(columns)
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Schema {}

/// Builder for constructing schemas fluently.
pub struct SchemaBuilder {
    columns: Vec<Column>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type));
        self
    }

    pub fn build(self) -> Schema {
        Schema::new(self.columns)
    }

    pub fn build_arc(self) -> Arc<Schema> {
        Arc::new(self.build())
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::builder()
            .column("id", DataType::Integer)
            .column("name", DataType::VarChar(64))
            .column("age", DataType::SmallInt)
            .build()
    }

    #[test]
    fn test_schema_layout() {
        let schema = sample();
        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.column_index("age"), Some(2));
        assert_eq!(schema.fixed_size(), 6);
        assert_eq!(schema.variable_count(), 1);
        assert_eq!(schema.null_bitmap_size(), 1);
        assert_eq!(schema.storage_size(), None);
    }

    #[test]
    fn test_copy_schema() {
        let schema = sample();
        let projected = Schema::copy_schema(&schema, &[2, 0]);
        assert_eq!(projected.column(0).name(), "age");
        assert_eq!(projected.column(1).name(), "id");
        assert_eq!(projected.column(1).ordinal(), 1);
    }

    #[test]
    fn test_fixed_schema_storage_size() {
        let schema = Schema::builder()
            .column("a", DataType::Integer)
            .column("b", DataType::BigInt)
            .build();
        assert_eq!(schema.storage_size(), Some(1 + 4 + 8));
    }
}
