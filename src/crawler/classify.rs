// src/crawler/classify.rs
//
// 课程页标记到内容类型的全部映射规则都集中在这里。
// Moodle 改版导致的识别问题只需要修改本文件。

use crate::{
    constants::moodle::{self, modules},
    models::ContentKind,
    utils,
};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static MOD_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/mod/([a-z0-9_]+)/view\.php$").unwrap());
static MODTYPE_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)modtype_([a-z0-9_]+)(?:\s|$)").unwrap());

/// 一个课程条目在页面上的可观察特征
#[derive(Debug, Clone, Default)]
pub struct EntryMarkup {
    pub url: Option<Url>,
    /// 来自 `modtype_xxx` 样式类
    pub modtype: Option<String>,
    /// 条目正文中嵌入了 H5P 播放器
    pub embeds_h5p: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ContentKind,
    pub module: Option<String>,
}

/// 从 `/mod/<type>/view.php` 形式的地址中取出模块类型
pub fn module_from_url(url: &Url) -> Option<String> {
    MOD_PATH_RE
        .captures(url.path())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn module_from_class(class_attr: &str) -> Option<String> {
    MODTYPE_CLASS_RE
        .captures(class_attr)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn is_h5p_embed(url: &Url) -> bool {
    url.path().ends_with(moodle::H5P_EMBED)
}

/// 指向文件本身的链接 (pluginfile.php 或已知文档扩展名)
pub fn is_direct_file(url: &Url) -> bool {
    url.path().contains(moodle::PLUGINFILE) || utils::has_file_extension(url)
}

/// 单个章节的页面 (`course/view.php?id=X&section=N` 或 `course/section.php?id=N`)
pub fn is_section_page(url: &Url) -> bool {
    let path = url.path();
    (path.ends_with(moodle::COURSE_VIEW) && url.query_pairs().any(|(k, _)| k == "section"))
        || path.ends_with(moodle::COURSE_SECTION)
}

/// 章节页地址中的章节序号
pub fn section_number(url: &Url) -> Option<usize> {
    if !url.path().ends_with(moodle::COURSE_VIEW) {
        return None;
    }
    url.query_pairs()
        .find(|(k, _)| k == "section")
        .and_then(|(_, v)| v.parse().ok())
}

pub fn classify(entry: &EntryMarkup) -> Classification {
    let module = entry
        .url
        .as_ref()
        .and_then(module_from_url)
        .or_else(|| entry.modtype.clone());

    let kind = match module.as_deref() {
        Some(modules::HVP | modules::H5P_ACTIVITY) => ContentKind::H5P,
        _ if entry.embeds_h5p => ContentKind::H5P,
        _ if entry.url.as_ref().is_some_and(is_h5p_embed) => ContentKind::H5P,
        Some(modules::QUIZ) => ContentKind::Quiz,
        Some(modules::RESOURCE | modules::URL | modules::PAGE | modules::FOLDER) => {
            ContentKind::Resource
        }
        Some(_) => ContentKind::Unknown,
        None if entry.url.as_ref().is_some_and(is_direct_file) => ContentKind::Resource,
        None => ContentKind::Unknown,
    };
    Classification { kind, module }
}

pub fn classify_url(url: &Url) -> Classification {
    classify(&EntryMarkup {
        url: Some(url.clone()),
        ..Default::default()
    })
}
