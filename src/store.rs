//! 项目记录存储：单个 JSON 数组文件，追加写入由单写者锁串行化。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

use crate::atomic::write_atomic;

/// 一次项目提交的元数据。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub github_link: String,
    pub file: String,
    pub uploaded_at: String,
}

#[derive(Debug)]
pub struct ProjectStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl ProjectStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 文件不存在时写入空数组，已存在的文件保持原样。
    pub async fn ensure_initialized(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        match fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                write_atomic(&self.path, b"[]").await?;
                info!(path = ?self.path, "created empty project data file");
                Ok(())
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// 读取全部记录（按追加顺序）。
    ///
    /// 记录按原样保留，文件里额外的键不会丢失。
    pub async fn load(&self) -> Result<Vec<Value>, StoreError> {
        let bytes = fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 在写锁内读取、追加并整体替换数组文件，返回追加后的记录数。
    pub async fn append(&self, record: ProjectRecord) -> Result<usize, StoreError> {
        let _guard = self.writer.lock().await;
        let mut records = self.load().await?;
        records.push(serde_json::to_value(record)?);
        let mut contents = serde_json::to_vec_pretty(&records)?;
        contents.push(b'\n');
        write_atomic(&self.path, &contents).await?;
        Ok(records.len())
    }
}

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "{err}"),
            StoreError::Json(err) => write!(f, "{err}"),
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Json(err)
    }
}
