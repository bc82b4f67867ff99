use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{contract, CrudError, Result};

/// One sort key: a field name and its direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub ascending: bool,
}

/// What to search for and how to order it.
///
/// `where_` is a conjunction of field equality conditions; an empty map
/// matches everything. `order_by` is applied key by key; an empty list keeps
/// the backend's natural order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchDetails {
    #[serde(rename = "where", default)]
    pub where_: Map<String, Value>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
}

impl SearchDetails {
    /// Match every item.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build the condition from the fields of a serializable value, e.g.
    /// `SearchDetails::matching(&json!({"name": "Joe", "size": 42}))`.
    pub fn matching<T: Serialize + ?Sized>(condition: &T) -> Result<Self> {
        match serde_json::to_value(condition)? {
            Value::Object(where_) => Ok(Self {
                where_,
                order_by: Vec::new(),
            }),
            other => Err(CrudError::contract(format!(
                "a search condition must be an object with properties, got {}",
                other
            ))),
        }
    }

    /// Add an equality condition.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_.insert(field.into(), value.into());
        self
    }

    /// Append a sort key.
    pub fn order(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            ascending,
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in &self.where_ {
            contract::require(!field.is_empty(), || {
                "search condition field names must not be empty".to_string()
            })?;
            contract::require(!matches!(value, Value::Array(_) | Value::Object(_)), || {
                format!(
                    "search condition {} must be a primitive value such as a number, string or boolean",
                    field
                )
            })?;
        }
        for (index, order) in self.order_by.iter().enumerate() {
            contract::require(!order.field.is_empty(), || {
                "order field names must not be empty".to_string()
            })?;
            let repeated = self.order_by[..index].iter().any(|o| o.field == order.field);
            contract::require(!repeated, || {
                format!("order field {} is listed more than once", order.field)
            })?;
        }
        Ok(())
    }
}
