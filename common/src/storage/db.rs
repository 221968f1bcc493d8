use std::ops::Deref;

use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

use super::types::StoredObject;
use crate::error::AppError;

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    /// Connect and authenticate against a running SurrealDB instance.
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Defines the vector index the retrieval path depends on. The dimension
    /// must match the configured embedding provider.
    pub async fn ensure_initialized(&self, embedding_dimensions: usize) -> Result<(), AppError> {
        self.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_embedding_chunks ON document_chunk FIELDS embedding HNSW DIMENSION {embedding_dimensions}"
            ))
            .await?;

        Ok(())
    }

    /// Stores an object under its own id, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `item` - The item to be stored
    ///
    /// # Returns
    /// * `Result` - Item or Error
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Retrieves all objects from a table, requires the struct to implement StoredObject
    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    /// Retrieves a single object by its ID, requires the struct to implement StoredObject
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Deletes a single object by its ID, requires the struct to implement StoredObject
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use crate::stored_object;

    use super::*;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    impl Dummy {
        fn sample(name: &str) -> Self {
            let now = chrono::Utc::now();
            Self {
                id: Uuid::new_v4().to_string(),
                created_at: now,
                updated_at: now,
                name: name.to_string(),
            }
        }
    }

    #[tokio::test]
    async fn store_and_fetch_roundtrip() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        let item = Dummy::sample("first");
        let id = item.id.clone();

        db.store_item(item).await.expect("store failed");

        let fetched: Option<Dummy> = db.get_item(&id).await.expect("get failed");
        assert_eq!(fetched.map(|d| d.name), Some("first".to_string()));
    }

    #[tokio::test]
    async fn delete_removes_item() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        let item = Dummy::sample("ephemeral");
        let id = item.id.clone();
        db.store_item(item).await.expect("store failed");

        let _: Option<Dummy> = db.delete_item(&id).await.expect("delete failed");

        let fetched: Option<Dummy> = db.get_item(&id).await.expect("get failed");
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn ensure_initialized_is_idempotent() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        db.ensure_initialized(8).await.expect("first init failed");
        db.ensure_initialized(8).await.expect("second init failed");
    }
}
