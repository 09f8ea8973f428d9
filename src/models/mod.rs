// src/models/mod.rs

pub mod h5p;
pub mod quiz;

pub use quiz::{AnswerOption, CorrectAnswer, QuestionBlock, QuizSnapshot};

use crate::error::AppError;
use crate::symbols;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::{fmt, path::PathBuf};

/// 课程条目的内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContentKind {
    Resource,
    Quiz,
    H5P,
    Unknown,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentKind::Resource => "资源",
            ContentKind::Quiz => "测验",
            ContentKind::H5P => "H5P",
            ContentKind::Unknown => "未知",
        };
        f.write_str(name)
    }
}

/// 从课程页枚举出的一个内容引用。生成后不再修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentReference {
    pub url: String,
    pub kind: ContentKind,
    pub display_name: String,
    /// 课程章节面包屑，决定输出目录层级
    pub section_path: Vec<String>,
    /// Moodle 模块类型 (resource/url/page/folder/quiz/hvp...)，直接文件链接为 None
    pub module: Option<String>,
}

impl ContentReference {
    /// 去重时使用的身份：同一 URL 在不同章节下视为不同条目
    pub fn identity(&self) -> (&str, &[String]) {
        (self.url.as_str(), self.section_path.as_slice())
    }
}

/// 已写入磁盘的产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    /// 目标位置已存在内容完全相同的文件，本次未产生新文件
    pub reused: bool,
}

/// 单个条目的处理结果
#[derive(Debug, Clone)]
pub enum ExtractOutcome {
    Written(Vec<WrittenFile>),
    /// 条目被有意跳过 (例如测验不可作答也不可查看)。
    /// `captured` 是跳过前保存的页面快照，不计入成功数。
    Unavailable { reason: String, captured: Vec<WrittenFile> },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DownloadStatus {
    Success,
    Reused,
    Skipped,
    Unresolvable,
    NoContent,
    HttpError,
    NetworkError,
    IoError,
    SecurityError,
    UnexpectedError,
}

impl DownloadStatus {
    pub fn get_display_info(
        &self,
    ) -> (
        &'static ColoredString,
        fn(ColoredString) -> ColoredString,
        &'static str,
    ) {
        match self {
            DownloadStatus::Success => (&symbols::OK, |s| s.green(), "已保存"),
            DownloadStatus::Reused => (&symbols::OK, |s| s.green(), "内容未变化，沿用已有文件"),
            DownloadStatus::Skipped => (&symbols::SKIP, |s| s.dimmed(), "已跳过"),
            DownloadStatus::Unresolvable => (&symbols::WARN, |s| s.yellow(), "无法解析文件地址"),
            DownloadStatus::NoContent => (&symbols::WARN, |s| s.yellow(), "没有可提取的内容"),
            DownloadStatus::HttpError => (&symbols::ERROR, |s| s.red(), "服务器返回错误"),
            DownloadStatus::NetworkError => (&symbols::ERROR, |s| s.red(), "网络请求失败"),
            DownloadStatus::IoError => (&symbols::ERROR, |s| s.red(), "本地文件读写错误"),
            DownloadStatus::SecurityError => (&symbols::ERROR, |s| s.red(), "拒绝写入不安全的路径"),
            DownloadStatus::UnexpectedError => {
                (&symbols::ERROR, |s| s.red(), "发生未预期的程序错误")
            }
        }
    }
}

impl DownloadStatus {
    /// 一个条目的全部产物都沿用了已有文件时记为 Reused
    pub fn for_written(files: &[WrittenFile]) -> Self {
        if !files.is_empty() && files.iter().all(|f| f.reused) {
            DownloadStatus::Reused
        } else {
            DownloadStatus::Success
        }
    }
}

impl From<&AppError> for DownloadStatus {
    fn from(error: &AppError) -> Self {
        use crate::error::{DownloadError, ExtractError, FetchError};
        match error {
            AppError::Download(DownloadError::Unresolvable(_)) => DownloadStatus::Unresolvable,
            AppError::Download(DownloadError::Transport { .. }) => DownloadStatus::NetworkError,
            AppError::Extract(ExtractError::NoContentFound(_)) => DownloadStatus::NoContent,
            AppError::Fetch(FetchError::NotFound { .. } | FetchError::ServerError { .. }) => {
                DownloadStatus::HttpError
            }
            AppError::Fetch(_) | AppError::Network(_) | AppError::NetworkMiddleware(_) => {
                DownloadStatus::NetworkError
            }
            AppError::Io(_) | AppError::TempFilePersist(_) => DownloadStatus::IoError,
            AppError::Security(_) => DownloadStatus::SecurityError,
            _ => DownloadStatus::UnexpectedError,
        }
    }
}
