// src/error.rs

use thiserror::Error;

/// 登录阶段的错误。认证失败对整次运行是致命的。
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("登录失败，请检查用户名和密码")]
    InvalidCredentials,
    #[error("登录时网络请求失败: {0}")]
    NetworkError(String),
    /// 重新登录后同一请求仍被重定向到登录页
    #[error("重新登录后会话仍然失效: {url}")]
    SessionExpired { url: String },
}

/// 页面获取阶段的错误。
#[derive(Error, Debug)]
pub enum FetchError {
    /// 服务器把请求重定向回登录页，说明会话已过期
    #[error("会话已失效 (被重定向到登录页): {url}")]
    Unauthorized { url: String },
    #[error("页面不存在或无权访问 ({status}): {url}")]
    NotFound { url: String, status: u16 },
    #[error("服务器错误 ({status}): {url}")]
    ServerError { url: String, status: u16 },
    #[error("网络请求失败: {0}")]
    Network(String),
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("无法从 '{0}' 解析出可下载的文件地址")]
    Unresolvable(String),
    #[error("传输失败 '{url}': {reason}")]
    Transport { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("未在 '{0}' 中找到可提取的 H5P 内容")]
    NoContentFound(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),
    #[error("网络中间件错误: {0}")]
    NetworkMiddleware(#[from] reqwest_middleware::Error),
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("临时文件持久化失败: {0}")]
    TempFilePersist(#[from] tempfile::PersistError),
    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("URL 解析错误: {0}")]
    Url(#[from] url::ParseError),
    #[error("H5P 包解析失败: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("配置错误: {0}")]
    Config(String),
    #[error("安全错误: {0}")]
    Security(String),
    #[error("用户中断")]
    UserInterrupt,
    #[error("未知错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// 认证类错误会终止整个运行，其余错误只影响单个条目。
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Auth(_) | AppError::UserInterrupt)
    }
}

pub type AppResult<T> = Result<T, AppError>;
