use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::Dispatcher;

use crate::error::ApiError;
use crate::storage::Storage;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub storage: Storage,
    pub jwt_secret: String,
    /// Externally reachable base URL, used to build upload and image URLs.
    pub public_url: String,
}

impl AppStateInner {
    /// Run database work off the async runtime.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub fn image_url(&self, storage_id: Uuid) -> String {
        format!("{}/storage/{}", self.public_url.trim_end_matches('/'), storage_id)
    }

    pub fn upload_url(&self, token: &str) -> String {
        format!("{}/uploads/{}", self.public_url.trim_end_matches('/'), token)
    }
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
