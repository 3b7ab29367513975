use crate::canvas::CanvasRegistry;
use crate::shared::config::AppConfig;
use crate::shared::utils::DbPool;
use std::sync::Arc;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub canvases: Arc<tokio::sync::Mutex<CanvasRegistry>>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            config: self.config.clone(),
            canvases: Arc::clone(&self.canvases),
        }
    }
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig) -> Self {
        Self {
            conn,
            config,
            canvases: Arc::new(tokio::sync::Mutex::new(CanvasRegistry::default())),
        }
    }
}
