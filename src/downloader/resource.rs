// src/downloader/resource.rs

use super::writer::ArtifactWriter;
use crate::{
    constants::{self, moodle::modules},
    crawler::classify,
    error::{AppResult, DownloadError},
    extractor::ContentExtractor,
    models::{ContentKind, ContentReference, ExtractOutcome, WrittenFile},
    session::{ParsedPage, SessionHandle},
    utils,
};
use async_trait::async_trait;
use futures::StreamExt;
use indicatif::HumanBytes;
use log::{debug, info, warn};
use regex::Regex;
use reqwest::{Response, header};
use scraper::Selector;
use std::{sync::LazyLock, time::Duration};
use url::Url;

/// 资源查看页中可能指向真实文件的位置，按优先级排列
static FILE_LINK_SELECTORS: LazyLock<Vec<(Selector, &'static str)>> = LazyLock::new(|| {
    [
        (".resourceworkaround a[href]", "href"),
        (r#"a[href*="/mod/resource/"][href*="redirect=1"]"#, "href"),
        (r#"#region-main a[href*="pluginfile.php"]"#, "href"),
        (r#"iframe#resourceobject[src], iframe[src*="pluginfile.php"]"#, "src"),
        (r#"object[data*="pluginfile.php"]"#, "data"),
        (r#"embed[src*="pluginfile.php"]"#, "src"),
        ("video source[src], audio source[src], video[src], audio[src]", "src"),
        (r#"a[href*="pluginfile.php"]"#, "href"),
    ]
    .into_iter()
    .map(|(css, attr)| (Selector::parse(css).unwrap(), attr))
    .collect()
});
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static URL_TARGET_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".urlworkaround a[href]").unwrap());
static MAIN_REGION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"#region-main [role="main"], #region-main, [role="main"]"#).unwrap());
static DISPOSITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\*\s*=\s*(?:UTF-8'')?([^;]+)|filename\s*=\s*"?([^";]+)"?"#).unwrap()
});

/// 资源地址解析的结果
enum Resolution {
    /// 响应体就是文件本身
    File(Response),
    /// 页面活动：保存正文
    PageHtml { title: String, html: String },
    /// 指向外部网页的链接活动：保存为快捷方式
    Shortcut(Url),
}

/// 把资源类引用解析为可下载的文件并原子写入磁盘。
///
/// 查看页到文件最多跟随一跳；一跳之后仍是网页即视为无法解析。
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceDownloader;

impl ResourceDownloader {
    pub fn new() -> Self {
        Self
    }

    pub async fn download(
        &self,
        handle: &mut SessionHandle,
        reference: &ContentReference,
        writer: &ArtifactWriter,
    ) -> AppResult<WrittenFile> {
        match self.resolve(handle, reference).await? {
            Resolution::File(res) => {
                save_response(handle, res, &reference.section_path, &reference.display_name, writer).await
            }
            Resolution::PageHtml { title, html } => {
                let name = format!("{}.html", base_name(&reference.display_name, &title));
                let document = page_document(&title, &html);
                writer.write_bytes(&reference.section_path, &name, document.as_bytes())
            }
            Resolution::Shortcut(target) => {
                info!("'{}' 指向网页，保存为快捷方式: {}", reference.display_name, target);
                let name = format!("{}.url", base_name(&reference.display_name, "link"));
                let shortcut = format!("[InternetShortcut]\r\nURL={}\r\n", target);
                writer.write_bytes(&reference.section_path, &name, shortcut.as_bytes())
            }
        }
    }

    async fn resolve(&self, handle: &mut SessionHandle, reference: &ContentReference) -> AppResult<Resolution> {
        let source = Url::parse(&reference.url)?;
        let res = handle.get_response(&reference.url).await?;
        if !is_html(&res) || (reference.module.is_none() && classify::is_direct_file(&source)) {
            debug!("'{}' 直接返回文件", reference.url);
            return Ok(Resolution::File(res));
        }

        let final_url = res.url().clone();
        let body = res.text().await.map_err(|e| transport(&reference.url, e))?;
        let page = ParsedPage::parse(final_url.clone(), body);

        match reference.module.as_deref() {
            Some(modules::PAGE) => {
                let html = page
                    .select_first(&MAIN_REGION_SEL)
                    .map(|el| el.inner_html())
                    .unwrap_or_else(|| page.raw.clone());
                let title = page.title().unwrap_or_else(|| reference.display_name.clone());
                Ok(Resolution::PageHtml { title, html })
            }
            Some(modules::URL) => {
                if final_url.host_str() != source.host_str() {
                    // 服务器已自动跳转到外部网页
                    return Ok(Resolution::Shortcut(final_url));
                }
                let target = external_target(&page, &source)
                    .ok_or_else(|| DownloadError::Unresolvable(reference.url.clone()))?;
                match handle.get_response(target.as_str()).await {
                    Ok(res) if !is_html(&res) => Ok(Resolution::File(res)),
                    Ok(_) => Ok(Resolution::Shortcut(target)),
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        warn!("无法访问外部链接 {}: {}，仅保存快捷方式", target, e);
                        Ok(Resolution::Shortcut(target))
                    }
                }
            }
            _ => {
                let file_url = find_file_link(&page)
                    .ok_or_else(|| DownloadError::Unresolvable(reference.url.clone()))?;
                debug!("'{}' 解析到文件地址 {}", reference.url, file_url);
                let res = handle.get_response(file_url.as_str()).await?;
                if is_html(&res) {
                    warn!("文件地址 {} 仍然返回网页，放弃继续跳转", file_url);
                    return Err(DownloadError::Unresolvable(reference.url.clone()).into());
                }
                Ok(Resolution::File(res))
            }
        }
    }
}

#[async_trait(?Send)]
impl ContentExtractor for ResourceDownloader {
    fn kind(&self) -> ContentKind {
        ContentKind::Resource
    }

    async fn extract(
        &self,
        handle: &mut SessionHandle,
        reference: &ContentReference,
        writer: &ArtifactWriter,
    ) -> AppResult<ExtractOutcome> {
        let written = self.download(handle, reference, writer).await?;
        Ok(ExtractOutcome::Written(vec![written]))
    }
}

/// 下载一个已知的文件地址。H5P 包等也走这里。
pub(crate) async fn save_url(
    handle: &mut SessionHandle,
    url: &str,
    section_path: &[String],
    display_name: &str,
    writer: &ArtifactWriter,
) -> AppResult<WrittenFile> {
    let res = handle.get_response(url).await?;
    if is_html(&res) {
        return Err(DownloadError::Unresolvable(url.to_string()).into());
    }
    save_response(handle, res, section_path, display_name, writer).await
}

/// 流式写入响应体；传输中断时整体重新请求，直到用完尝试次数
async fn save_response(
    handle: &mut SessionHandle,
    first: Response,
    section_path: &[String],
    display_name: &str,
    writer: &ArtifactWriter,
) -> AppResult<WrittenFile> {
    let file_url = first.url().to_string();
    let filename = filename_for(display_name, first.url(), first.headers());
    let mut response = Some(first);
    let mut last_reason = String::new();

    for attempt in 1..=constants::DOWNLOAD_ATTEMPTS {
        let res = match response.take() {
            Some(res) => res,
            None => {
                let delay = constants::DOWNLOAD_RETRY_DELAY_MS * u64::from(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                handle.get_response(&file_url).await?
            }
        };

        let mut pending = writer.begin(section_path, &filename)?;
        let mut stream = res.bytes_stream();
        let mut interrupted = None;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => pending.write_chunk(&bytes)?,
                Err(e) => {
                    interrupted = Some(e.to_string());
                    break;
                }
            }
        }

        match interrupted {
            None => {
                debug!("'{}' 传输完成 ({})", filename, HumanBytes(pending.bytes_written()));
                return pending.commit();
            }
            Some(reason) => {
                // pending 在此被丢弃，临时文件随之删除
                warn!(
                    "下载 '{}' 中断 (第 {}/{} 次): {}",
                    file_url,
                    attempt,
                    constants::DOWNLOAD_ATTEMPTS,
                    reason
                );
                last_reason = reason;
            }
        }
    }

    Err(DownloadError::Transport {
        url: file_url,
        reason: last_reason,
    }
    .into())
}

fn transport(url: &str, e: reqwest::Error) -> DownloadError {
    DownloadError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

fn is_html(res: &Response) -> bool {
    let headers = res.headers();
    let attachment = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("attachment"));
    let html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("text/html"));
    html && !attachment
}

fn find_file_link(page: &ParsedPage) -> Option<Url> {
    FILE_LINK_SELECTORS
        .iter()
        .flat_map(|(sel, attr)| page.select(sel).filter_map(move |el| el.value().attr(attr)))
        .filter_map(|href| page.resolve(href))
        .next()
        .or_else(|| {
            page.select(&ANCHOR_SEL)
                .filter_map(|a| a.value().attr("href"))
                .filter_map(|href| page.resolve(href))
                .find(utils::has_file_extension)
        })
}

fn external_target(page: &ParsedPage, source: &Url) -> Option<Url> {
    page.select(&URL_TARGET_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| page.resolve(href))
        .next()
        .or_else(|| {
            let scope = page.select_first(&MAIN_REGION_SEL)?;
            scope
                .select(&ANCHOR_SEL)
                .filter_map(|a| a.value().attr("href"))
                .filter_map(|href| page.resolve(href))
                .find(|u| u.host_str() != source.host_str())
        })
}

/// 页面活动正文包装成独立的 HTML 文档
fn page_document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}\n</body></html>\n",
        utils::escape_html(title),
        body
    )
}

fn base_name(display_name: &str, fallback: &str) -> String {
    let name = display_name.trim();
    if name.is_empty() { fallback.to_string() } else { name.to_string() }
}

fn disposition_filename(headers: &header::HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_DISPOSITION)?.to_str().ok()?;
    let caps = DISPOSITION_RE.captures(value)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
    let decoded = percent_encoding::percent_decode_str(raw).decode_utf8_lossy().into_owned();
    Some(decoded).filter(|s| !s.is_empty())
}

fn extension_for_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let preferred = match essence.as_str() {
        "application/pdf" => Some("pdf"),
        "text/plain" => Some("txt"),
        "text/html" => Some("html"),
        "text/csv" => Some("csv"),
        "image/jpeg" => Some("jpg"),
        "application/zip" => Some("zip"),
        "video/mp4" => Some("mp4"),
        "audio/mpeg" => Some("mp3"),
        _ => None,
    };
    preferred.map(str::to_string).or_else(|| {
        mime_guess::get_mime_extensions_str(&essence)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
    })
}

/// 文件扩展名依次取自：最终 URL、Content-Disposition、Content-Type，都没有时为 `bin`
fn filename_for(display_name: &str, final_url: &Url, headers: &header::HeaderMap) -> String {
    let disposition = disposition_filename(headers);
    let ext = utils::url_extension(final_url)
        .or_else(|| {
            disposition
                .as_deref()
                .and_then(|name| std::path::Path::new(name).extension())
                .map(|e| e.to_string_lossy().to_lowercase())
        })
        .or_else(|| {
            headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(extension_for_content_type)
        })
        .unwrap_or_else(|| "bin".to_string());

    let fallback = disposition.unwrap_or_else(|| "file".to_string());
    let base = base_name(display_name, &fallback);
    if base.to_lowercase().ends_with(&format!(".{}", ext)) {
        base
    } else {
        format!("{}.{}", base, ext)
    }
}
