use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::store::{Collection, Document, DocumentStore, Filter, StoreError};

pub const ADMIN_ROLE: &str = "admin";

/// Typed view over a document in the `user` collection.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string, never exposed
    pub role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TryFrom<Document> for UserRecord {
    type Error = StoreError;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        let field = |key: &str| {
            doc.get_str(key).map(str::to_string).ok_or_else(|| {
                StoreError::Backend(format!("user document {} has no {key}", doc.id))
            })
        };
        let email = field("email")?;
        let password_hash = field("password_hash")?;
        let role = doc.get_str("role").unwrap_or(ADMIN_ROLE).to_string();
        Ok(Self {
            email,
            password_hash,
            role,
            id: doc.id,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
    }
}

impl UserRecord {
    const COLLECTION: Collection = Collection::Users;

    pub async fn find_by_email(
        store: &dyn DocumentStore,
        email: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        store
            .find_one(Self::COLLECTION.name(), &Filter::new().eq("email", email))
            .await?
            .map(UserRecord::try_from)
            .transpose()
    }

    pub async fn admin_exists(store: &dyn DocumentStore) -> Result<bool, StoreError> {
        let admins = store
            .list(
                Self::COLLECTION.name(),
                &Filter::new().eq("role", ADMIN_ROLE),
                Some(1),
            )
            .await?;
        Ok(!admins.is_empty())
    }

    pub async fn create(
        store: &dyn DocumentStore,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<UserRecord, StoreError> {
        let mut fields = Map::new();
        fields.insert("email".into(), Value::from(email));
        fields.insert("password_hash".into(), Value::from(password_hash));
        fields.insert("role".into(), Value::from(role));
        let doc = store.create(Self::COLLECTION.name(), fields).await?;
        UserRecord::try_from(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, store::MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(ManualClock::default()))
    }

    #[tokio::test]
    async fn create_then_find_by_email() {
        let store = store();
        let created = UserRecord::create(&store, "a@b.co", "$argon2id$x", ADMIN_ROLE)
            .await
            .unwrap();
        let found = UserRecord::find_by_email(&store, "a@b.co")
            .await
            .unwrap()
            .expect("user exists");
        assert_eq!(found.id, created.id);
        assert_eq!(found.role, ADMIN_ROLE);
        assert!(UserRecord::find_by_email(&store, "x@b.co")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn admin_exists_tracks_role() {
        let store = store();
        assert!(!UserRecord::admin_exists(&store).await.unwrap());
        UserRecord::create(&store, "viewer@b.co", "h", "viewer")
            .await
            .unwrap();
        assert!(!UserRecord::admin_exists(&store).await.unwrap());
        UserRecord::create(&store, "a@b.co", "h", ADMIN_ROLE)
            .await
            .unwrap();
        assert!(UserRecord::admin_exists(&store).await.unwrap());
    }

    #[test]
    fn serialization_hides_password_hash() {
        let user = UserRecord {
            id: "1".into(),
            email: "test@example.com".into(),
            password_hash: "secret-hash".into(),
            role: ADMIN_ROLE.into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(!json.contains("secret-hash"));
    }

    #[test]
    fn missing_role_defaults_to_admin() {
        let doc = Document {
            id: "1".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
            fields: json!({"email": "a@b.co", "password_hash": "h"})
                .as_object()
                .cloned()
                .unwrap(),
        };
        assert_eq!(UserRecord::try_from(doc).unwrap().role, ADMIN_ROLE);
    }
}
