//! 已上传文件的下载处理器，支持 Range 与缓存相关头。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use httpdate::{fmt_http_date, parse_http_date};
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::etag::{etag_from_metadata, is_not_modified};
use crate::filename::is_safe_stored_name;
use crate::storage::{Storage, StorageError};

fn not_found(name: &str) -> ApiError {
    ApiError::NotFound(format!("File not found: {name}"))
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|_| ApiError::Internal("failed to build header".into()))
}

/// 以附件形式下载上传目录中的文件。
///
/// 只接受存储文件名允许的字符，任何目录组件或非法字符都按不存在处理。
pub async fn download_upload(
    Path(filename): Path<String>,
    request_headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    if !is_safe_stored_name(&filename) {
        warn!(filename, "rejected download with unsafe name");
        return Err(not_found(&filename));
    }
    let target = match storage.resolve_path_checked(&filename, false).await {
        Ok(target) => target,
        Err(StorageError::InvalidPath) => return Err(not_found(&filename)),
        Err(StorageError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(not_found(&filename));
        }
        Err(err) => return Err(err.into()),
    };
    let metadata = fs::metadata(&target).await.map_err(StorageError::from)?;
    if metadata.is_dir() {
        return Err(not_found(&filename));
    }

    let file_size = metadata.len();
    let modified = metadata.modified().ok();
    let etag = etag_from_metadata(&metadata);
    let mime = mime_guess::from_path(&filename).first_or_octet_stream();

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::ETAG, header_value(&etag)?);
    if let Some(modified) = modified {
        response_headers.insert(header::LAST_MODIFIED, header_value(&fmt_http_date(modified))?);
    }
    if is_not_modified(&request_headers, &etag) {
        debug!(filename, "download not modified");
        return Err(ApiError::NotModified(response_headers));
    }

    response_headers.insert(header::CONTENT_TYPE, header_value(mime.essence_str())?);
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&format!("attachment; filename=\"{filename}\""))?,
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let range = if if_range_matches(&request_headers, modified, &etag) {
        parse_range(request_headers.get(header::RANGE), file_size)?
    } else {
        None
    };

    let mut file = File::open(&target).await.map_err(StorageError::from)?;

    if let Some((start, end)) = range {
        let length = end - start + 1;
        debug!(filename, start, end, length, "download range request accepted");
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        let stream = ReaderStream::new(file.take(length));
        response_headers.insert(
            header::CONTENT_RANGE,
            header_value(&format!("bytes {start}-{end}/{file_size}"))?,
        );
        response_headers.insert(header::CONTENT_LENGTH, header_value(&length.to_string())?);
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    response_headers.insert(header::CONTENT_LENGTH, header_value(&file_size.to_string())?);
    info!(filename, size = file_size, "download file");
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// `If-Range` 缺省或仍与当前文件一致时返回 true。
fn if_range_matches(headers: &HeaderMap, modified: Option<SystemTime>, etag: &str) -> bool {
    let Some(value) = headers
        .get(header::IF_RANGE)
        .and_then(|value| value.to_str().ok())
    else {
        return true;
    };
    match parse_http_date(value) {
        Ok(date) => modified.map(|ts| whole_seconds(ts) <= date).unwrap_or(false),
        Err(_) => value == etag,
    }
}

// HTTP 日期只精确到秒。
fn whole_seconds(ts: SystemTime) -> SystemTime {
    let secs = ts
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0);
    UNIX_EPOCH + Duration::from_secs(secs)
}

/// 解析单段 Range 头，返回闭区间 `(start, end)`。
fn parse_range(
    value: Option<&HeaderValue>,
    file_size: u64,
) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let invalid = || ApiError::BadRequest("invalid Range header".into());
    let value = value.to_str().map_err(|_| invalid())?;
    let Some(range) = value.strip_prefix("bytes=") else {
        return Err(invalid());
    };
    if range.contains(',') {
        return Err(ApiError::BadRequest("multiple ranges not supported".into()));
    }
    if file_size == 0 {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }

    let (start_part, end_part) = range.split_once('-').ok_or_else(invalid)?;
    let (start, end) = if start_part.is_empty() {
        let suffix: u64 = end_part.parse().map_err(|_| invalid())?;
        if suffix == 0 {
            return Err(ApiError::RangeNotSatisfiable(file_size));
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let start: u64 = start_part.parse().map_err(|_| invalid())?;
        let end = if end_part.is_empty() {
            file_size - 1
        } else {
            end_part
                .parse::<u64>()
                .map_err(|_| invalid())?
                .min(file_size - 1)
        };
        (start, end)
    };

    if start > end || start >= file_size {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }
    Ok(Some((start, end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(value: &'static str, size: u64) -> Result<Option<(u64, u64)>, ApiError> {
        parse_range(Some(&HeaderValue::from_static(value)), size)
    }

    fn if_range(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_RANGE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn if_range_date_ignores_sub_second_mtime() {
        let modified = UNIX_EPOCH + Duration::new(1_700_000_000, 750_000_000);
        let same_second = if_range(&fmt_http_date(modified));
        assert!(if_range_matches(&same_second, Some(modified), "W/\"x\""));

        let earlier = if_range(&fmt_http_date(UNIX_EPOCH + Duration::from_secs(1_699_999_999)));
        assert!(!if_range_matches(&earlier, Some(modified), "W/\"x\""));
        assert!(!if_range_matches(&same_second, None, "W/\"x\""));
    }

    #[test]
    fn if_range_falls_back_to_etag() {
        assert!(if_range_matches(&HeaderMap::new(), None, "W/\"x\""));
        assert!(if_range_matches(&if_range("W/\"x\""), None, "W/\"x\""));
        assert!(!if_range_matches(&if_range("W/\"y\""), None, "W/\"x\""));
    }

    #[test]
    fn parse_range_accepts_single_ranges() {
        assert!(matches!(parse_range(None, 10), Ok(None)));
        assert!(matches!(range("bytes=0-3", 10), Ok(Some((0, 3)))));
        assert!(matches!(range("bytes=4-", 10), Ok(Some((4, 9)))));
        assert!(matches!(range("bytes=-3", 10), Ok(Some((7, 9)))));
        assert!(matches!(range("bytes=5-99", 10), Ok(Some((5, 9)))));
    }

    #[test]
    fn parse_range_rejects_bad_input() {
        assert!(matches!(range("bytes=0-1,3-4", 10), Err(ApiError::BadRequest(_))));
        assert!(matches!(range("items=0-1", 10), Err(ApiError::BadRequest(_))));
        assert!(matches!(range("bytes=a-b", 10), Err(ApiError::BadRequest(_))));
        assert!(matches!(
            range("bytes=10-12", 10),
            Err(ApiError::RangeNotSatisfiable(10))
        ));
        assert!(matches!(
            range("bytes=0-1", 0),
            Err(ApiError::RangeNotSatisfiable(0))
        ));
    }
}
