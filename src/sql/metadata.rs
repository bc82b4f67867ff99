use crate::error::{CrudError, Result};
use crate::model::{Model, OrderBy, SearchDetails, TokenKind};

/// How a model maps onto a table.
///
/// Row fields are the model's serialized field names, so the column names
/// here must match them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub table_name: String,
    pub id_column: String,
    /// Column holding the concurrency token, if the model carries one.
    pub token_column: String,
    /// Order used when a search names none. Falls back to the id column.
    pub default_order_by: Vec<OrderBy>,
}

impl TableMetadata {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            id_column: "Id".to_string(),
            token_column: "Etag".to_string(),
            default_order_by: Vec::new(),
        }
    }

    /// Metadata for `M`, using its collection name as the table name.
    pub fn for_model<M: Model>() -> Self {
        Self::new(M::COLLECTION)
    }

    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    pub fn with_token_column(mut self, column: impl Into<String>) -> Self {
        self.token_column = column.into();
        self
    }

    pub fn with_default_order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.default_order_by.push(OrderBy {
            field: column.into(),
            ascending,
        });
        self
    }

    /// The ordering for a search: the caller's, else the default, else by id.
    pub fn order_for(&self, details: &SearchDetails) -> Vec<OrderBy> {
        if !details.order_by.is_empty() {
            details.order_by.clone()
        } else if !self.default_order_by.is_empty() {
            self.default_order_by.clone()
        } else {
            vec![OrderBy {
                field: self.id_column.clone(),
                ascending: true,
            }]
        }
    }

    /// Whether the token column is written by the store (ETag) or by the
    /// database (row version).
    pub(crate) fn writes_token(&self, kind: Option<TokenKind>) -> bool {
        kind != Some(TokenKind::RowVersion)
    }

    pub fn validate(&self) -> Result<()> {
        require_identifier(&self.table_name)?;
        require_identifier(&self.id_column)?;
        require_identifier(&self.token_column)?;
        for order in &self.default_order_by {
            require_identifier(&order.field)?;
        }
        Ok(())
    }
}

/// Identifiers are spliced into SQL text, so only plain names are allowed.
pub(crate) fn require_identifier(name: &str) -> Result<()> {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        Ok(())
    } else {
        Err(CrudError::contract(format!(
            "{:?} is not a valid table or column name",
            name
        )))
    }
}
