// src/models/h5p.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// `.h5p` 包根目录下的 h5p.json
#[derive(Deserialize, Debug, Clone)]
pub struct H5pManifest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "mainLibrary", default)]
    pub main_library: Option<String>,
}

/// 播放器页面中 `H5PIntegration` 设置对象里我们关心的部分
#[derive(Deserialize, Debug, Clone, Default)]
pub struct H5pIntegration {
    #[serde(default)]
    pub contents: HashMap<String, H5pIntegrationContent>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct H5pIntegrationContent {
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// 内容树，本身是一个 JSON 字符串
    #[serde(rename = "jsonContent", default)]
    pub json_content: Option<String>,
    #[serde(rename = "exportUrl", default)]
    pub export_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl H5pIntegrationContent {
    pub fn content_tree(&self) -> Option<Value> {
        self.json_content
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

/// H5P 内容是从哪里取得的
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum H5pSource {
    /// 下载到了 `.h5p` 包
    Package,
    /// 只有播放器页面中的设置对象
    PlayerSettings,
}

/// H5P_SUMMARY.json 中的一项
#[derive(Serialize, Debug, Clone)]
pub struct H5pSummaryEntry {
    pub title: String,
    pub url: String,
    pub section: String,
    pub source: H5pSource,
    pub library: Option<String>,
    /// 相对课程目录的路径
    pub files: Vec<String>,
    pub excerpt: String,
    pub correct_answers: Vec<String>,
}
