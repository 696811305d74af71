//! 项目提交处理器：解析表单、校验字段、落盘文件并追加记录。

use axum::extract::multipart::Field;
use axum::extract::{Extension, Multipart};
use chrono::Local;
use std::fmt::Display;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::UPLOADED_AT_FORMAT;
use crate::error::ApiError;
use crate::filename::{is_allowed_extension, sanitize_filename, split_extension};
use crate::storage::Storage;
use crate::store::{ProjectRecord, ProjectStore};

const MISSING_FIELDS: &str = "Please fill all required fields and select a file.";
const TYPE_NOT_ALLOWED: &str = "File type not allowed.";
const INVALID_FILE_NAME: &str = "Invalid file name.";

enum FilePart {
    /// 已写入上传目录。
    Stored { name: String, size: u64 },
    /// 文件名未通过校验，内容被跳过。
    Rejected(&'static str),
}

#[derive(Default)]
struct SubmissionForm {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    github_link: Option<String>,
    file: Option<FilePart>,
}

impl SubmissionForm {
    /// 读取全部 multipart 字段；同名字段只取第一个。
    ///
    /// 文件字段边读边写入上传目录，读取失败时删除已写入的文件。
    async fn read(
        mut multipart: Multipart,
        storage: &Storage,
        timestamp: i64,
    ) -> Result<Self, ApiError> {
        let mut form = SubmissionForm::default();
        if let Err(err) = form.read_fields(&mut multipart, storage, timestamp).await {
            form.discard_file(storage).await;
            return Err(err);
        }
        Ok(form)
    }

    async fn read_fields(
        &mut self,
        multipart: &mut Multipart,
        storage: &Storage,
        timestamp: i64,
    ) -> Result<(), ApiError> {
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            let slot = match name.as_str() {
                "title" => &mut self.title,
                "description" => &mut self.description,
                "category" => &mut self.category,
                "github_link" => &mut self.github_link,
                "file" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    if self.file.is_none() && !file_name.is_empty() {
                        self.file = Some(store_file(field, &file_name, storage, timestamp).await?);
                    }
                    continue;
                }
                _ => continue,
            };
            let value = field.text().await?;
            if slot.is_none() {
                *slot = Some(value.trim().to_string());
            }
        }
        Ok(())
    }

    async fn discard_file(&mut self, storage: &Storage) {
        if let Some(FilePart::Stored { name, .. }) = self.file.take() {
            remove_orphan(storage, &name).await;
        }
    }
}

/// 校验客户端文件名后把字段内容分块写入新预留的文件。
async fn store_file(
    mut field: Field<'_>,
    raw_name: &str,
    storage: &Storage,
    timestamp: i64,
) -> Result<FilePart, ApiError> {
    if !is_allowed_extension(raw_name) {
        warn!(name = raw_name, "rejected upload with disallowed extension");
        return Ok(FilePart::Rejected(TYPE_NOT_ALLOWED));
    }
    let sanitized = sanitize_filename(raw_name);
    if !is_allowed_extension(&sanitized) {
        warn!(name = raw_name, sanitized, "upload name unusable after sanitizing");
        return Ok(FilePart::Rejected(INVALID_FILE_NAME));
    }
    let (base, ext) = split_extension(&sanitized);

    let (name, mut file) = storage
        .reserve_unique(base, ext, timestamp)
        .await
        .map_err(processing_error)?;
    let written = async {
        let mut size = 0u64;
        while let Some(chunk) = field.chunk().await? {
            size += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(processing_error)?;
        }
        file.sync_all().await.map_err(processing_error)?;
        Ok::<_, ApiError>(size)
    }
    .await;
    drop(file);

    match written {
        Ok(size) => {
            debug!(file = name.as_str(), size, "upload written");
            Ok(FilePart::Stored { name, size })
        }
        Err(err) => {
            remove_orphan(storage, &name).await;
            Err(err)
        }
    }
}

async fn remove_orphan(storage: &Storage, name: &str) {
    if let Err(err) = storage.remove(name).await {
        warn!(file = name, error = %err, "failed to remove orphaned upload");
    }
}

fn processing_error(err: impl Display) -> ApiError {
    ApiError::Internal(format!("Error processing upload: {err}"))
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

/// 接收项目提交：成功返回 `OK`，校验失败 400，其余失败 500。
pub async fn upload_project(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(store): Extension<Arc<ProjectStore>>,
    multipart: Multipart,
) -> Result<&'static str, ApiError> {
    let now = Local::now();
    let mut form = SubmissionForm::read(multipart, &storage, now.timestamp()).await?;

    let (Some(title), Some(description), Some(category)) = (
        required(form.title.take()),
        required(form.description.take()),
        required(form.category.take()),
    ) else {
        form.discard_file(&storage).await;
        return Err(ApiError::BadRequest(MISSING_FIELDS.into()));
    };
    let Some(file) = form.file.take() else {
        return Err(ApiError::BadRequest(MISSING_FIELDS.into()));
    };
    let (stored, size) = match file {
        FilePart::Stored { name, size } => (name, size),
        FilePart::Rejected(reason) => return Err(ApiError::BadRequest(reason.into())),
    };

    let record = ProjectRecord {
        title,
        description,
        category,
        github_link: form.github_link.unwrap_or_default(),
        file: stored.clone(),
        uploaded_at: now.format(UPLOADED_AT_FORMAT).to_string(),
    };
    let count = match store.append(record).await {
        Ok(count) => count,
        Err(err) => {
            remove_orphan(&storage, &stored).await;
            return Err(processing_error(err));
        }
    };

    info!(file = stored.as_str(), size, records = count, "project uploaded");
    Ok("OK")
}
