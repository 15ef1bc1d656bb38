use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Minimal projection of a user record: just enough to address an email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub email: String,

    #[serde(default)]
    pub name: Option<String>,
}
