use serde_json::{Map, Value};

use super::metadata::{require_identifier, TableMetadata};
use crate::error::Result;
use crate::model::{OrderBy, SearchDetails};

/// A parameterized statement. Placeholders are written `@Name` and bound
/// from `params`.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Map<String, Value>,
}

/// Parameter names used by the generated statements. Column parameters are
/// named after their column.
pub const OLD_TOKEN_PARAM: &str = "OldToken";
pub const OFFSET_PARAM: &str = "PageOffset";
pub const LIMIT_PARAM: &str = "PageLimit";

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Map::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// `[Field] = @Field` for each condition, `[Field] IS NULL` for nulls.
pub fn where_as_list(where_: &Map<String, Value>) -> Result<Vec<String>> {
    where_
        .iter()
        .map(|(field, value)| {
            require_identifier(field)?;
            Ok(if value.is_null() {
                format!("[{}] IS NULL", field)
            } else {
                format!("[{}] = @{}", field, field)
            })
        })
        .collect()
}

/// `[Field] ASC` / `[Field] DESC` for each sort key.
pub fn order_by_as_list(order_by: &[OrderBy]) -> Result<Vec<String>> {
    order_by
        .iter()
        .map(|order| {
            require_identifier(&order.field)?;
            Ok(format!(
                "[{}] {}",
                order.field,
                if order.ascending { "ASC" } else { "DESC" }
            ))
        })
        .collect()
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

fn bind_where(mut statement: Statement, where_: &Map<String, Value>) -> Statement {
    for (field, value) in where_ {
        if !value.is_null() {
            statement.params.insert(field.clone(), value.clone());
        }
    }
    statement
}

pub fn insert(metadata: &TableMetadata, row: &Map<String, Value>) -> Result<Statement> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for column in row.keys() {
        require_identifier(column)?;
        columns.push(format!("[{}]", column));
        values.push(format!("@{}", column));
    }
    let sql = format!(
        "INSERT INTO [{}] ({}) VALUES ({})",
        metadata.table_name,
        columns.join(", "),
        values.join(", ")
    );
    Ok(Statement {
        sql,
        params: row.clone(),
    })
}

pub fn select_by_id(metadata: &TableMetadata, id: Value) -> Statement {
    Statement::new(format!(
        "SELECT * FROM [{}] WHERE [{}] = @{}",
        metadata.table_name, metadata.id_column, metadata.id_column
    ))
    .param(metadata.id_column.clone(), id)
}

/// Row lock held until the surrounding transaction ends. Rows locked by
/// someone else are skipped rather than waited for.
pub fn select_for_transaction_lock(metadata: &TableMetadata, id: Value) -> Statement {
    Statement::new(format!(
        "SELECT * FROM [{}] WITH (ROWLOCK, UPDLOCK, READPAST) WHERE [{}] = @{}",
        metadata.table_name, metadata.id_column, metadata.id_column
    ))
    .param(metadata.id_column.clone(), id)
}

/// Update every column of `row` except the id. With `old_token`, the update
/// only applies while the token column still holds that value.
pub fn update(
    metadata: &TableMetadata,
    id: Value,
    row: &Map<String, Value>,
    old_token: Option<String>,
) -> Result<Statement> {
    let mut assignments = Vec::with_capacity(row.len());
    let mut params = Map::new();
    for (column, value) in row {
        if *column == metadata.id_column {
            continue;
        }
        require_identifier(column)?;
        assignments.push(format!("[{}] = @{}", column, column));
        params.insert(column.clone(), value.clone());
    }
    params.insert(metadata.id_column.clone(), id);

    let mut conditions = vec![format!("[{}] = @{}", metadata.id_column, metadata.id_column)];
    if let Some(old_token) = old_token {
        conditions.push(format!("[{}] = @{}", metadata.token_column, OLD_TOKEN_PARAM));
        params.insert(OLD_TOKEN_PARAM.to_string(), Value::String(old_token));
    }

    Ok(Statement {
        sql: format!(
            "UPDATE [{}] SET {}{}",
            metadata.table_name,
            assignments.join(", "),
            where_clause(&conditions)
        ),
        params,
    })
}

pub fn delete_by_id(metadata: &TableMetadata, id: Value) -> Statement {
    Statement::new(format!(
        "DELETE FROM [{}] WHERE [{}] = @{}",
        metadata.table_name, metadata.id_column, metadata.id_column
    ))
    .param(metadata.id_column.clone(), id)
}

pub fn delete_all(metadata: &TableMetadata) -> Statement {
    Statement::new(format!("DELETE FROM [{}]", metadata.table_name))
}

/// Count of rows matching the search conditions, returned in column `Count`.
pub fn count(metadata: &TableMetadata, details: &SearchDetails) -> Result<Statement> {
    let conditions = where_as_list(&details.where_)?;
    let statement = Statement::new(format!(
        "SELECT COUNT(*) AS [Count] FROM [{}]{}",
        metadata.table_name,
        where_clause(&conditions)
    ));
    Ok(bind_where(statement, &details.where_))
}

/// One page of rows matching the search.
pub fn search(
    metadata: &TableMetadata,
    details: &SearchDetails,
    offset: usize,
    limit: usize,
) -> Result<Statement> {
    let conditions = where_as_list(&details.where_)?;
    let order = order_by_as_list(&metadata.order_for(details))?;
    let statement = Statement::new(format!(
        "SELECT * FROM [{}]{} ORDER BY {} OFFSET @{} ROWS FETCH NEXT @{} ROWS ONLY",
        metadata.table_name,
        where_clause(&conditions),
        order.join(", "),
        OFFSET_PARAM,
        LIMIT_PARAM
    ))
    .param(OFFSET_PARAM, offset)
    .param(LIMIT_PARAM, limit);
    Ok(bind_where(statement, &details.where_))
}
