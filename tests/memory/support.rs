//! Models for the in-memory store suite.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use crud_rust::{concurrency, Concurrency, ConcurrencyToken, Model};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Install a subscriber once; `RUST_LOG=crud_rust=debug` shows engine events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A model with a string ETag and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub age: u32,
    pub nickname: Option<String>,
    pub etag: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Person {
    pub fn new(name: &str, age: u32) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.to_string(),
            age,
            nickname: None,
            etag: String::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

impl Model for Person {
    type Id = Uuid;
    const COLLECTION: &'static str = "Person";

    fn assign_id(&mut self, id: &Uuid) {
        self.id = *id;
    }

    fn concurrency(&self) -> Concurrency {
        Concurrency::WithToken(ConcurrencyToken::ETag(self.etag.clone()))
    }

    fn set_concurrency_token(&mut self, token: ConcurrencyToken) {
        self.etag = token.as_etag();
    }

    fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}

/// A model without a concurrency token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tally {
    pub id: i64,
    pub label: String,
    pub count: i64,
}

impl Tally {
    pub fn new(label: &str, count: i64) -> Self {
        Self {
            id: 0,
            label: label.to_string(),
            count,
        }
    }
}

impl Model for Tally {
    type Id = i64;
    const COLLECTION: &'static str = "Tally";

    fn assign_id(&mut self, id: &i64) {
        self.id = *id;
    }
}

/// A model with a binary row version, exposed as base-64 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    pub id: u64,
    pub owner: String,
    pub balance: i64,
    pub row_version: String,
}

impl Account {
    pub fn new(owner: &str, balance: i64) -> Self {
        Self {
            id: 0,
            owner: owner.to_string(),
            balance,
            row_version: String::new(),
        }
    }
}

impl Model for Account {
    type Id = u64;
    const COLLECTION: &'static str = "Account";

    fn assign_id(&mut self, id: &u64) {
        self.id = *id;
    }

    fn concurrency(&self) -> Concurrency {
        let bytes = concurrency::decode_row_version(&self.row_version).unwrap_or_default();
        Concurrency::WithToken(ConcurrencyToken::RowVersion(bytes))
    }

    fn set_concurrency_token(&mut self, token: ConcurrencyToken) {
        self.row_version = token.as_etag();
    }
}
