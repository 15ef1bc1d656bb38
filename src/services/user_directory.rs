use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::{Collection, Database};

use crate::error::StoreError;
use crate::models::UserRef;
use crate::services::alert_engine::UserDirectory;

/// Resolves user ids to notification addresses out of the `users`
/// collection owned by the identity service.
#[derive(Clone)]
pub struct MongoUserDirectory {
    users: Collection<UserRef>,
}

impl MongoUserDirectory {
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection::<UserRef>("users"),
        }
    }
}

#[async_trait]
impl UserDirectory for MongoUserDirectory {
    async fn find_user(&self, user_id: ObjectId) -> Result<Option<UserRef>, StoreError> {
        let user = self.users.find_one(doc! { "_id": user_id }, None).await?;
        Ok(user)
    }
}
