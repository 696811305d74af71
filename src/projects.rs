//! 项目列表处理器。

use axum::extract::Extension;
use axum::response::Json as JsonResponse;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::store::ProjectStore;

/// 以 JSON 数组原样返回全部项目记录。
pub async fn list_projects(
    Extension(store): Extension<Arc<ProjectStore>>,
) -> Result<JsonResponse<Vec<Value>>, ApiError> {
    let records = store
        .load()
        .await
        .map_err(|err| ApiError::LoadFailed(format!("Failed to load projects: {err}")))?;
    info!(count = records.len(), "list projects");
    Ok(JsonResponse(records))
}
