// src/config/credentials.rs

use crate::{
    constants,
    error::{AppError, AppResult},
    ui,
};
use anyhow::Context;
use log::{debug, info};
use std::{fmt, fs, path::Path};

/// 登录凭据。加载一次后只交给 `SessionAuthenticator` 持有。
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

// 日志里永远不打印密码
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 解析 key=value 格式的凭据文本。`#` 开头的行和空行会被忽略。
pub fn parse_credentials(content: &str) -> Option<Credentials> {
    let mut username = None;
    let mut password = None;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else { continue };
        match key.trim().to_lowercase().as_str() {
            "username" => username = Some(value.trim().to_string()),
            "password" => password = Some(value.trim().to_string()),
            other => debug!("凭据文件中忽略未知键 '{}'", other),
        }
    }
    match (username, password) {
        (Some(u), Some(p)) if !u.is_empty() => Some(Credentials::new(u, p)),
        _ => None,
    }
}

pub fn load_credentials_file(path: &Path) -> AppResult<Credentials> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("读取凭据文件 '{}' 失败", path.display()))?;
    parse_credentials(&content).ok_or_else(|| {
        AppError::Config(format!(
            "凭据文件 '{}' 缺少 username 或 password",
            path.display()
        ))
    })
}

/// 按 凭据文件 > 环境变量 > 交互输入 的顺序获取凭据。
pub fn resolve_credentials(file: Option<&Path>) -> AppResult<Credentials> {
    if let Some(path) = file {
        info!("从凭据文件 {} 加载登录信息", path.display());
        return load_credentials_file(path);
    }
    if let (Ok(u), Ok(p)) = (
        std::env::var(constants::ENV_USERNAME),
        std::env::var(constants::ENV_PASSWORD),
    ) && !u.is_empty()
    {
        info!("使用来自环境变量 {} 的登录信息", constants::ENV_USERNAME);
        return Ok(Credentials::new(u, p));
    }
    let username = ui::prompt("用户名", None).map_err(|_| AppError::UserInterrupt)?;
    if username.is_empty() {
        return Err(AppError::Config("用户名不能为空".to_string()));
    }
    let password = ui::prompt_hidden("密码 (输入不可见)").map_err(|_| AppError::UserInterrupt)?;
    Ok(Credentials::new(username, password))
}
