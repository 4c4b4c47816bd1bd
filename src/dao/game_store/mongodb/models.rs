use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::SessionEntity;

/// Session document in the `sessions` collection; `revision` drives compare-and-swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub revision: i64,
    #[serde(flatten)]
    pub session: SessionEntity,
}

impl MongoSessionDocument {
    pub fn new(session: SessionEntity, revision: i64) -> Self {
        Self {
            id: session.pin.clone(),
            revision,
            session,
        }
    }
}

pub fn pin_filter(pin: &str) -> Document {
    doc! { "_id": pin }
}

pub fn revision_filter(pin: &str, revision: i64) -> Document {
    doc! { "_id": pin, "revision": revision }
}
