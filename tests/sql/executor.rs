//! Scripted executor: replays queued responses and records every statement.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use crud_rust::sql::{Row, SqlError, SqlExecutor, Statement};
use crud_rust::CancellationToken;
use serde_json::Value;

pub enum Reply {
    Rows(Vec<Row>),
    Affected(u64),
    Fail(SqlError),
}

#[derive(Default)]
pub struct ScriptedExecutor {
    replies: Mutex<VecDeque<Reply>>,
    statements: Mutex<Vec<Statement>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn rows(&self, rows: Vec<Value>) -> &Self {
        let rows = rows
            .into_iter()
            .map(|row| match row {
                Value::Object(row) => row,
                other => panic!("rows must be objects, got {}", other),
            })
            .collect();
        self.reply(Reply::Rows(rows))
    }

    pub fn no_rows(&self) -> &Self {
        self.reply(Reply::Rows(Vec::new()))
    }

    pub fn affected(&self, count: u64) -> &Self {
        self.reply(Reply::Affected(count))
    }

    pub fn fail(&self, error: SqlError) -> &Self {
        self.reply(Reply::Fail(error))
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    fn next(&self, statement: &Statement) -> Reply {
        self.statements.lock().unwrap().push(statement.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("no reply scripted for {}", statement.sql))
    }
}

#[async_trait]
impl SqlExecutor for ScriptedExecutor {
    async fn query(
        &self,
        statement: &Statement,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Row>, SqlError> {
        match self.next(statement) {
            Reply::Rows(rows) => Ok(rows),
            Reply::Affected(_) => panic!("expected a query reply for {}", statement.sql),
            Reply::Fail(error) => Err(error),
        }
    }

    async fn execute(
        &self,
        statement: &Statement,
        _cancel: &CancellationToken,
    ) -> Result<u64, SqlError> {
        match self.next(statement) {
            Reply::Affected(count) => Ok(count),
            Reply::Rows(_) => panic!("expected an execute reply for {}", statement.sql),
            Reply::Fail(error) => Err(error),
        }
    }
}
