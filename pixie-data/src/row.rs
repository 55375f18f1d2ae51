use std::ops::Index;
use std::sync::Arc;

use crate::column::Schema;
use crate::value::Value;

/// A single decoded row, addressable both by column name and by position.
///
/// Rows are value types that carry a shared reference to their table's
/// [`Schema`] rather than their own copy of the column list, so a large
/// row-batch only allocates one `Schema` regardless of row count.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Row {
        debug_assert_eq!(schema.len(), values.len());
        Row { schema, values }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl Index<&str> for Row {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        self.get(name)
            .unwrap_or_else(|| panic!("no column named '{name}' in row"))
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, idx: usize) -> &Value {
        &self.values[idx]
    }
}
