// src/extractor/h5p.rs

use super::{
    ContentExtractor,
    h5p_render::{self, H5pDocument},
};
use crate::{
    constants,
    crawler::classify,
    downloader::{ArtifactWriter, save_url},
    error::{AppResult, ExtractError},
    models::{
        ContentKind, ContentReference, ExtractOutcome, WrittenFile,
        h5p::{H5pIntegration, H5pIntegrationContent, H5pSource, H5pSummaryEntry},
    },
    session::{ParsedPage, SessionHandle},
    utils,
};
use async_trait::async_trait;
use itertools::Itertools;
use log::{debug, info, warn};
use scraper::Selector;
use std::{cell::RefCell, fs::File, io::BufReader, sync::LazyLock};
use url::Url;

static EMBED_IFRAME_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"iframe[src*="h5p/embed.php"], iframe[src*="/mod/hvp/embed.php"]"#).unwrap()
});
static PACKAGE_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*=".h5p"]"#).unwrap());
static CONTENT_ID_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-content-id]").unwrap());
static SCRIPT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

const INTEGRATION_MARKER: &str = "H5PIntegration";

/// 播放器页面上能找到的全部线索
#[derive(Debug, Default)]
struct PlayerInfo {
    content_id: Option<String>,
    /// 候选的 `.h5p` 包地址，按优先级排列
    packages: Vec<Url>,
    integration: Option<H5pIntegration>,
    /// 内嵌播放器页面，设置对象可能只存在于其中
    embed_pages: Vec<Url>,
}

impl PlayerInfo {
    fn merge(&mut self, other: PlayerInfo) {
        if self.content_id.is_none() {
            self.content_id = other.content_id;
        }
        self.packages.extend(other.packages);
        self.packages = std::mem::take(&mut self.packages).into_iter().unique().collect();
        if self.integration.is_none() {
            self.integration = other.integration;
        }
        self.embed_pages.extend(other.embed_pages);
    }

    /// 设置对象中第一个带内容树的条目
    fn integration_content(&self) -> Option<&H5pIntegrationContent> {
        let integration = self.integration.as_ref()?;
        integration
            .contents
            .iter()
            .sorted_by_key(|(key, _)| *key)
            .map(|(_, content)| content)
            .find(|content| content.json_content.is_some())
    }
}

/// H5P 活动提取器。
///
/// 优先下载平台提供的 `.h5p` 包 (同时渲染一份 Markdown)；
/// 拿不到包时退而解析播放器页面中的 `H5PIntegration` 设置对象。
/// 处理过的内容在 `finish` 时汇总成 H5P_SUMMARY.md/.json。
#[derive(Debug, Default)]
pub struct H5pExtractor {
    summaries: RefCell<Vec<H5pSummaryEntry>>,
}

impl H5pExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn remember(
        &self,
        reference: &ContentReference,
        writer: &ArtifactWriter,
        source: H5pSource,
        document: Option<&H5pDocument>,
        files: &[WrittenFile],
    ) {
        self.summaries.borrow_mut().push(H5pSummaryEntry {
            title: document
                .map(|d| d.title.clone())
                .unwrap_or_else(|| reference.display_name.clone()),
            url: reference.url.clone(),
            section: reference.section_path.join("/"),
            source,
            library: document.and_then(|d| d.library.clone()),
            files: files.iter().map(|f| utils::relative_display(writer.root(), &f.path)).collect(),
            excerpt: document.map(|d| d.excerpt.clone()).unwrap_or_default(),
            correct_answers: document.map(|d| d.correct_answers.clone()).unwrap_or_default(),
        });
    }

    async fn try_packages(
        &self,
        handle: &mut SessionHandle,
        reference: &ContentReference,
        writer: &ArtifactWriter,
        packages: &[Url],
    ) -> AppResult<Option<Vec<WrittenFile>>> {
        for package in packages {
            debug!("尝试下载 H5P 包: {}", package);
            match save_url(handle, package.as_str(), &reference.section_path, &reference.display_name, writer).await {
                Ok(file) => {
                    info!("已下载 H5P 包: {}", file.path.display());
                    let mut written = vec![file];
                    let document = match render_downloaded(&written[0], reference) {
                        Ok(document) => {
                            let name = format!("{}.md", reference.display_name);
                            written.push(writer.write_bytes(
                                &reference.section_path,
                                &name,
                                document.markdown.as_bytes(),
                            )?);
                            Some(document)
                        }
                        Err(e) => {
                            warn!("H5P 包无法解析为文档 ({})，只保留原始包", e);
                            None
                        }
                    };
                    self.remember(reference, writer, H5pSource::Package, document.as_ref(), &written);
                    return Ok(Some(written));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("H5P 包 {} 下载失败: {}", package, e),
            }
        }
        Ok(None)
    }
}

#[async_trait(?Send)]
impl ContentExtractor for H5pExtractor {
    fn kind(&self) -> ContentKind {
        ContentKind::H5P
    }

    async fn extract(
        &self,
        handle: &mut SessionHandle,
        reference: &ContentReference,
        writer: &ArtifactWriter,
    ) -> AppResult<ExtractOutcome> {
        let source = Url::parse(&reference.url)?;
        let mut info = PlayerInfo {
            packages: embedded_package(&source).into_iter().collect(),
            ..Default::default()
        };

        // 页面打不开时，地址里已知的包仍然值得一试
        let mut page_error = None;
        match handle.get_page(&reference.url).await {
            Ok(page) => info.merge(inspect(&page)),
            Err(e) if e.is_fatal() || info.packages.is_empty() => return Err(e),
            Err(e) => {
                warn!("H5P 页面 {} 获取失败 ({})，直接尝试地址中的包", reference.url, e);
                page_error = Some(e);
            }
        }
        if let Some(id) = &info.content_id {
            debug!("H5P 内容标识: {}", id);
        }

        if let Some(written) = self.try_packages(handle, reference, writer, &info.packages.clone()).await? {
            return Ok(ExtractOutcome::Written(written));
        }

        if info.integration.is_none() {
            for embed in info.embed_pages.clone() {
                debug!("在内嵌播放器页面中查找 H5P 设置: {}", embed);
                match handle.get_page(embed.as_str()).await {
                    Ok(embed_page) => {
                        let found = inspect(&embed_page);
                        let new_packages: Vec<Url> =
                            found.packages.iter().filter(|p| !info.packages.contains(p)).cloned().collect();
                        info.merge(found);
                        if let Some(written) = self.try_packages(handle, reference, writer, &new_packages).await? {
                            return Ok(ExtractOutcome::Written(written));
                        }
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!("内嵌播放器页面 {} 获取失败: {}", embed, e),
                }
                if info.integration.is_some() {
                    break;
                }
            }
        }

        if let Some(content) = info.integration_content() {
            if let Some(tree) = content.content_tree().filter(h5p_render::has_content) {
                let title = content
                    .title
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| reference.display_name.clone());
                let document =
                    h5p_render::render_document(&title, content.library.as_deref(), &reference.url, &tree);
                let name = format!("{}.md", reference.display_name);
                let file = writer.write_bytes(&reference.section_path, &name, document.markdown.as_bytes())?;
                info!("已从播放器设置生成 H5P 文档: {}", file.path.display());
                let written = vec![file];
                self.remember(reference, writer, H5pSource::PlayerSettings, Some(&document), &written);
                return Ok(ExtractOutcome::Written(written));
            }
        }

        Err(page_error.unwrap_or_else(|| ExtractError::NoContentFound(reference.url.clone()).into()))
    }

    fn finish(&self, writer: &ArtifactWriter) -> AppResult<Vec<WrittenFile>> {
        let summaries = self.summaries.borrow();
        if summaries.is_empty() {
            return Ok(Vec::new());
        }
        let markdown = summary_markdown(&summaries);
        let json = serde_json::to_string_pretty(&*summaries)?;
        let files = vec![
            writer.write_bytes(&[], constants::H5P_SUMMARY_MD, markdown.as_bytes())?,
            writer.write_bytes(&[], constants::H5P_SUMMARY_JSON, json.as_bytes())?,
        ];
        info!("已写出 {} 个 H5P 内容的汇总", summaries.len());
        Ok(files)
    }
}

fn summary_markdown(entries: &[H5pSummaryEntry]) -> String {
    let mut out = vec![
        "# H5P 汇总".to_string(),
        String::new(),
        format!("共 {} 个 H5P 内容。", entries.len()),
    ];
    for entry in entries {
        out.push(String::new());
        out.push(format!("## {}", entry.title));
        out.push(String::new());
        out.push(format!("- 章节: {}", entry.section));
        if let Some(library) = &entry.library {
            out.push(format!("- 类型: {}", library));
        }
        out.push(format!("- 来源: {}", entry.url));
        let source = match entry.source {
            H5pSource::Package => "原始包",
            H5pSource::PlayerSettings => "播放器设置",
        };
        out.push(format!("- 获取方式: {}", source));
        for file in &entry.files {
            out.push(format!("- 文件: [{}](<{}>)", file, file));
        }
        if !entry.excerpt.is_empty() {
            out.push(String::new());
            out.push(format!("> {}", entry.excerpt));
        }
        if !entry.correct_answers.is_empty() {
            out.push(String::new());
            out.push("正确答案:".to_string());
            out.push(String::new());
            out.extend(entry.correct_answers.iter().map(|a| format!("- {}", a)));
        }
    }
    let mut doc = out.join("\n");
    doc.push('\n');
    doc
}

fn render_downloaded(file: &WrittenFile, reference: &ContentReference) -> AppResult<H5pDocument> {
    let reader = BufReader::new(File::open(&file.path)?);
    h5p_render::render_package(reader, &reference.display_name, &reference.url)
}

/// `h5p/embed.php?url=<包地址>` 中的包地址
fn embedded_package(url: &Url) -> Option<Url> {
    if !classify::is_h5p_embed(url) {
        return None;
    }
    url.query_pairs()
        .find(|(k, _)| k == "url")
        .and_then(|(_, v)| Url::parse(&v).ok())
}

fn inspect(page: &ParsedPage) -> PlayerInfo {
    let mut info = PlayerInfo::default();

    for iframe in page.select(&EMBED_IFRAME_SEL) {
        let Some(src) = iframe.value().attr("src").and_then(|s| page.resolve(s)) else { continue };
        if let Some(package) = embedded_package(&src) {
            info.packages.push(package);
        }
        if info.content_id.is_none() {
            info.content_id = src.query_pairs().find(|(k, _)| k == "id").map(|(_, v)| v.into_owned());
        }
        info.embed_pages.push(src);
    }

    info.packages.extend(
        page.select(&PACKAGE_LINK_SEL)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| page.resolve(href))
            .filter(|url| url.path().ends_with(".h5p") || url.path().contains("/export")),
    );

    if let Some(id) = page
        .select(&CONTENT_ID_SEL)
        .filter_map(|el| el.value().attr("data-content-id"))
        .next()
    {
        info.content_id = Some(id.to_string());
    }

    if let Some(integration) = page
        .select(&SCRIPT_SEL)
        .map(|s| s.text().collect::<String>())
        .filter(|text| text.contains(INTEGRATION_MARKER))
        .find_map(|text| parse_integration(&text))
    {
        for (key, content) in &integration.contents {
            if info.content_id.is_none() {
                info.content_id = Some(key.trim_start_matches("cid-").to_string());
            }
            if let Some(export) = content
                .export_url
                .as_deref()
                .filter(|u| !u.is_empty())
                .and_then(|u| page.resolve(u))
            {
                info.packages.push(export);
            }
        }
        info.integration = Some(integration);
    }

    info.packages = info.packages.into_iter().unique().collect();
    info
}

/// 从脚本文本中取出 `H5PIntegration = {...}` 的 JSON 对象
fn parse_integration(script: &str) -> Option<H5pIntegration> {
    let start = script.find(INTEGRATION_MARKER)?;
    let after = &script[start + INTEGRATION_MARKER.len()..];
    let assign = after.find('=')?;
    let rest = &after[assign + 1..];
    let open = rest.find('{')?;
    let object = balanced_object(&rest[open..])?;
    match serde_json::from_str(object) {
        Ok(integration) => Some(integration),
        Err(e) => {
            warn!("H5PIntegration 设置对象解析失败: {}", e);
            None
        }
    }
}

/// 以 `{` 开头的文本中，与之配对的完整对象 (跳过字符串内的括号)
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_object() {
        let text = r#"{"a":{"b":"}{"},"c":"\"}"} trailing;"#;
        assert_eq!(balanced_object(text), Some(r#"{"a":{"b":"}{"},"c":"\"}"}"#));
        assert_eq!(balanced_object("{unterminated"), None);
    }

    #[test]
    fn test_inspect_player_page() {
        let body = r#"<html><body>
            <iframe src="https://m.example.org/h5p/embed.php?url=https%3A%2F%2Fm.example.org%2Fpluginfile.php%2F9%2Fmod_h5pactivity%2Fpackage%2F0%2Fquiz.h5p&amp;preventredirect=0"></iframe>
            <script>var H5PIntegration = {"contents":{"cid-42":{"library":"H5P.MultiChoice 1.16","title":"Quiz","jsonContent":"{\"question\":\"<p>2+2 ?<\/p>\"}","exportUrl":"\/pluginfile.php\/9\/core_h5p\/export\/quiz-42.h5p"}}};</script>
        </body></html>"#;
        let page = ParsedPage::parse(Url::parse("https://m.example.org/mod/h5pactivity/view.php?id=8").unwrap(), body.to_string());
        let info = inspect(&page);

        assert_eq!(info.content_id.as_deref(), Some("42"));
        let packages: Vec<_> = info.packages.iter().map(Url::as_str).collect();
        assert_eq!(
            packages,
            vec![
                "https://m.example.org/pluginfile.php/9/mod_h5pactivity/package/0/quiz.h5p",
                "https://m.example.org/pluginfile.php/9/core_h5p/export/quiz-42.h5p",
            ]
        );
        assert_eq!(info.embed_pages.len(), 1);

        let content = info.integration_content().unwrap();
        assert_eq!(content.library.as_deref(), Some("H5P.MultiChoice 1.16"));
        let tree = content.content_tree().unwrap();
        assert_eq!(tree["question"], "<p>2+2 ?</p>");
    }

    #[test]
    fn test_page_without_player() {
        let page = ParsedPage::parse(
            Url::parse("https://m.example.org/mod/hvp/view.php?id=3").unwrap(),
            "<html><body><p>nothing</p><script>var other = {};</script></body></html>".to_string(),
        );
        let info = inspect(&page);
        assert!(info.packages.is_empty() && info.integration.is_none() && info.content_id.is_none());
    }
}
