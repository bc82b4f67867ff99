//! Paged test model.

use crud_rust::Model;
use serde::{Deserialize, Serialize};

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
