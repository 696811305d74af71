//! 上传文件名的清洗、扩展名校验与拆分。

use crate::config::ALLOWED_EXTENSIONS;

const MAX_FILENAME_LEN: usize = 200;

/// 为存储时追加的 `_{timestamp}_{n}` 后缀预留的长度。
const STORED_SUFFIX_RESERVE: usize = 32;

const WINDOWS_DEVICE_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// 判断客户端文件名的扩展名（最后一个点之后，忽略大小写）是否在白名单内。
pub fn is_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// 将客户端提供的文件名转换为可安全落盘的名字。
///
/// 去掉目录部分与非 ASCII 字符，空白折叠为 `_`，只保留 `[A-Za-z0-9._-]`，
/// 并去除首尾的 `.` 与 `_`。结果为空表示没有可用的名字。
pub fn sanitize_filename(raw: &str) -> String {
    let last = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let collapsed = last
        .chars()
        .filter(char::is_ascii)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    let filtered: String = collapsed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let truncated = truncate(trim_edges(&filtered));
    let mut name = trim_edges(&truncated).to_string();

    let stem = name.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_NAMES
        .iter()
        .any(|device| stem.eq_ignore_ascii_case(device))
    {
        name.insert(0, '_');
    }
    name
}

/// 判断下载请求的名字能否指向上传目录中的文件。
///
/// 只允许 `[A-Za-z0-9._-]` 且不以 `.` 开头，因此不含目录组件，也不会是
/// `..`。存储文件名（包括设备名加 `_` 前缀的情况）都满足。
pub fn is_safe_stored_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// 按最后一个点拆分为主体与扩展名（扩展名含点）。
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

fn trim_edges(value: &str) -> &str {
    value.trim_matches(|c: char| c == '.' || c == '_')
}

// 只处理 ASCII，按字节截断是安全的。存储后缀追加后仍不超过 MAX_FILENAME_LEN。
fn truncate(name: &str) -> String {
    let limit = MAX_FILENAME_LEN - STORED_SUFFIX_RESERVE;
    if name.len() <= limit {
        return name.to_string();
    }
    let (base, ext) = split_extension(name);
    if ext.is_empty() || ext.len() >= limit {
        return name[..limit].to_string();
    }
    format!("{}{ext}", &base[..limit - ext.len()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_plain_names() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("file-name_123.jpg"), "file-name_123.jpg");
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\slides.pptx"), "slides.pptx");
        assert_eq!(sanitize_filename("../"), "");
        assert_eq!(sanitize_filename(".."), "");
    }

    #[test]
    fn sanitize_handles_whitespace_and_symbols() {
        assert_eq!(sanitize_filename("my final  report.docx"), "my_final_report.docx");
        assert_eq!(sanitize_filename("test<script>.png"), "testscript.png");
        assert_eq!(sanitize_filename("résumé.pdf"), "rsum.pdf");
        assert_eq!(sanitize_filename("  .hidden.txt  "), "hidden.txt");
    }

    #[test]
    fn sanitize_prefixes_device_names() {
        assert_eq!(sanitize_filename("con.txt"), "_con.txt");
        assert_eq!(sanitize_filename("LPT1"), "_LPT1");
        assert_eq!(sanitize_filename("console.txt"), "console.txt");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let long = "z".repeat(300);
        for raw in [
            "a b c.zip",
            "../x/_y_.txt",
            "NUL.pdf",
            "weird__name..png",
            long.as_str(),
        ] {
            let once = sanitize_filename(raw);
            assert_eq!(sanitize_filename(&once), once, "input {raw:?}");
            assert!(once.len() <= MAX_FILENAME_LEN - STORED_SUFFIX_RESERVE + 1);
        }
    }

    #[test]
    fn long_names_leave_room_for_stored_suffix() {
        let raw = format!("{}.pdf", "a".repeat(250));
        let sanitized = sanitize_filename(&raw);
        assert!(sanitized.ends_with(".pdf"));

        let (base, ext) = split_extension(&sanitized);
        let stored = format!("{base}_{}_{}{ext}", i64::MAX, crate::storage::MAX_NAME_ATTEMPTS);
        assert!(stored.len() <= MAX_FILENAME_LEN, "stored length {}", stored.len());
        assert!(is_safe_stored_name(&stored));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(is_allowed_extension("deck.PPTX"));
        assert!(is_allowed_extension("archive.tar.zip"));
        assert!(!is_allowed_extension("script.exe"));
        assert!(!is_allowed_extension("noextension"));
        assert!(!is_allowed_extension("pdf"));
    }

    #[test]
    fn split_extension_uses_last_dot() {
        assert_eq!(split_extension("a.tar.zip"), ("a.tar", ".zip"));
        assert_eq!(split_extension("plain"), ("plain", ""));
    }

    #[test]
    fn safe_stored_name_accepts_every_stored_shape() {
        assert!(is_safe_stored_name("report_1700000000.pdf"));
        assert!(is_safe_stored_name("_con_1700000000.txt"));
        assert!(is_safe_stored_name("my_final_report_1700000000_2.docx"));
        assert!(is_safe_stored_name("notes-v2_1.txt"));
    }

    #[test]
    fn safe_stored_name_rejects_traversal() {
        assert!(!is_safe_stored_name("../project_data.json"));
        assert!(!is_safe_stored_name(".."));
        assert!(!is_safe_stored_name(".hidden.txt"));
        assert!(!is_safe_stored_name("sub/file.txt"));
        assert!(!is_safe_stored_name("sub\\file.txt"));
        assert!(!is_safe_stored_name("bad name.txt"));
        assert!(!is_safe_stored_name(""));
    }
}
