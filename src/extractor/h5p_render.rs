// src/extractor/h5p_render.rs
//
// 把 H5P 内容树渲染成一份可阅读的 Markdown 文档。

use crate::{error::AppResult, models::h5p::H5pManifest, utils};
use scraper::Html;
use serde_json::{Map, Value};
use std::io::{Read, Seek};

/// 这些键下面是界面文案、授权信息或内部标识，不属于内容本身
const SKIPPED_KEYS: &[&str] = &[
    "l10n", "UI", "i10n", "behaviour", "overallFeedback", "metadata", "copyright", "license",
    "licenseVersion", "authors", "changes", "source", "subContentId", "mime", "path", "version",
    "contentType", "extraTitle", "yearFrom", "yearTo", "defaultLanguage", "confirmCheck",
    "confirmRetry", "a11y", "params",
];
/// 先于其他键输出，使题干出现在选项之前
const LEADING_KEYS: &[&str] = &["title", "introduction", "task", "question", "text"];
/// 汇总中摘录的最大宽度
const EXCERPT_WIDTH: usize = 300;

/// 渲染好的文档，以及汇总文件需要的摘要
#[derive(Debug, Clone)]
pub struct H5pDocument {
    pub title: String,
    pub library: Option<String>,
    pub markdown: String,
    pub excerpt: String,
    /// 标记为正确的选项
    pub correct_answers: Vec<String>,
}

#[derive(Debug, Default)]
struct Renderer {
    body: Vec<String>,
    media: Vec<String>,
    correct: Vec<String>,
}

impl Renderer {
    fn text(&mut self, raw: &str) {
        let text = html_to_text(raw);
        if is_human_text(&text) && self.body.last() != Some(&text) {
            self.body.push(text);
        }
    }

    fn heading(&mut self, library: &str) {
        // "H5P.MultiChoice 1.16" -> "MultiChoice"
        let name = library
            .split_whitespace()
            .next()
            .unwrap_or(library)
            .trim_start_matches("H5P.");
        self.body.push(format!("### {}", name));
    }

    fn answer(&mut self, raw: &str, correct: bool) {
        let text = html_to_text(raw);
        if text.is_empty() {
            return;
        }
        self.body.push(format!("- [{}] {}", if correct { "x" } else { " " }, text));
        if correct && !self.correct.contains(&text) {
            self.correct.push(text);
        }
    }

    fn media(&mut self, path: &str, mime: Option<&str>) {
        let entry = match mime {
            Some(mime) => format!("- {} ({})", path, mime),
            None => format!("- {}", path),
        };
        if !self.media.contains(&entry) {
            self.media.push(entry);
        }
    }

    fn walk(&mut self, value: &Value) {
        match value {
            Value::Object(map) => self.walk_object(map),
            Value::Array(items) => items.iter().for_each(|item| self.walk(item)),
            Value::String(s) => self.text(s),
            _ => {}
        }
    }

    fn walk_object(&mut self, map: &Map<String, Value>) {
        if let Some(library) = map.get("library").and_then(Value::as_str) {
            self.heading(library);
        }
        if let Some(path) = map.get("path").and_then(Value::as_str) {
            self.media(path, map.get("mime").and_then(Value::as_str));
        }
        if let (Some(text), Some(correct)) = (
            map.get("text").and_then(Value::as_str),
            map.get("correct").and_then(Value::as_bool),
        ) {
            self.answer(text, correct);
            return;
        }

        for key in LEADING_KEYS {
            if let Some(value) = map.get(*key) {
                self.walk(value);
            }
        }
        for (key, value) in map {
            if LEADING_KEYS.contains(&key.as_str()) || SKIPPED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if key == "library" {
                continue;
            }
            self.walk(value);
        }
        // params 中才是子内容的正文
        if let Some(params) = map.get("params") {
            self.walk(params);
        }
    }

    /// 正文中的叙述性文字 (不含标题与选项)
    fn excerpt(&self) -> String {
        let prose = self
            .body
            .iter()
            .filter(|line| !line.starts_with("### ") && !line.starts_with("- ["))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        utils::truncate_text(&prose, EXCERPT_WIDTH)
    }
}

fn html_to_text(raw: &str) -> String {
    if !raw.contains('<') && !raw.contains('&') {
        return utils::normalize_whitespace(raw);
    }
    let fragment = Html::parse_fragment(raw);
    utils::normalize_whitespace(&fragment.root_element().text().collect::<Vec<_>>().join(" "))
}

fn is_human_text(text: &str) -> bool {
    text.chars().count() >= 2
        && text.chars().any(char::is_alphabetic)
        && !text.starts_with("http://")
        && !text.starts_with("https://")
}

/// 渲染一棵内容树
pub fn render_document(title: &str, library: Option<&str>, source_url: &str, tree: &Value) -> H5pDocument {
    let mut renderer = Renderer::default();
    renderer.walk(tree);
    let excerpt = renderer.excerpt();
    let correct_answers = std::mem::take(&mut renderer.correct);

    let mut out = vec![format!("# {}", title), String::new()];
    if let Some(library) = library {
        out.push(format!("- 类型: {}", library));
    }
    out.push(format!("- 来源: {}", source_url));
    out.push(String::new());

    if !renderer.body.is_empty() {
        out.push("## 内容".to_string());
        out.push(String::new());
        for line in renderer.body {
            let is_list = line.starts_with("- ");
            out.push(line);
            if !is_list {
                out.push(String::new());
            }
        }
    }
    if !renderer.media.is_empty() {
        out.push(String::new());
        out.push("## 媒体".to_string());
        out.push(String::new());
        out.extend(renderer.media);
    }
    let mut markdown = out.join("\n");
    markdown.push('\n');
    H5pDocument {
        title: title.to_string(),
        library: library.map(str::to_string),
        markdown,
        excerpt,
        correct_answers,
    }
}

/// 内容树里是否有可读内容
pub fn has_content(tree: &Value) -> bool {
    let mut renderer = Renderer::default();
    renderer.walk(tree);
    !renderer.body.is_empty() || !renderer.media.is_empty()
}

/// 从 `.h5p` 包 (zip) 中读取 h5p.json 与 content/content.json 并渲染
pub fn render_package<R: Read + Seek>(reader: R, fallback_title: &str, source_url: &str) -> AppResult<H5pDocument> {
    let mut archive = zip::ZipArchive::new(reader)?;

    let manifest: H5pManifest = {
        let mut raw = String::new();
        archive.by_name("h5p.json")?.read_to_string(&mut raw)?;
        serde_json::from_str(&raw)?
    };
    let tree: Value = {
        let mut raw = String::new();
        archive.by_name("content/content.json")?.read_to_string(&mut raw)?;
        serde_json::from_str(&raw)?
    };

    let title = manifest
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| fallback_title.to_string());
    Ok(render_document(&title, manifest.main_library.as_deref(), source_url, &tree))
}
