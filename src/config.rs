//! 命令行参数、环境变量与服务默认值。

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_DATA_FILE: &str = "project_data.json";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 100 * 1024 * 1024;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// 允许上传的扩展名（小写，不含点）。
pub const ALLOWED_EXTENSIONS: [&str; 8] = ["pdf", "docx", "zip", "png", "jpg", "jpeg", "pptx", "txt"];

/// 记录中 `uploaded_at` 的格式。
pub const UPLOADED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "project-drop", version = VERSION_INFO, about = "Project submission server")]
pub struct Args {
    #[arg(
        short = 'u',
        long,
        env = "PROJECT_DROP_UPLOAD_DIR",
        default_value = DEFAULT_UPLOAD_DIR,
        help = "Directory holding uploaded files"
    )]
    pub upload_dir: String,
    #[arg(
        short = 'd',
        long,
        env = "PROJECT_DROP_DATA_FILE",
        default_value = DEFAULT_DATA_FILE,
        help = "JSON array file holding project records"
    )]
    pub data_file: String,
    #[arg(
        short = 'b',
        long = "bind",
        env = "PROJECT_DROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "PROJECT_DROP_PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "PROJECT_DROP_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload request size in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
    #[arg(
        long,
        env = "PROJECT_DROP_CORS_ORIGINS",
        help = "Comma separated CORS origins"
    )]
    pub cors_origins: Option<String>,
}
