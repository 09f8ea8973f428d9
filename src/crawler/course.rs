// src/crawler/course.rs

use super::{
    classify::{self, EntryMarkup},
    outline::CourseOutline,
};
use crate::{
    constants::moodle::modules,
    error::{AppError, AppResult},
    models::{ContentKind, ContentReference},
    session::{ParsedPage, SessionHandle, visible_text},
    utils,
};
use log::{debug, info, warn};
use scraper::{ElementRef, Selector};
use std::{
    collections::{HashSet, VecDeque},
    sync::LazyLock,
};
use url::Url;

static SECTION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li.section, li.course-section").unwrap());
static SECTION_NAME_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".sectionname, .section-title, h3").unwrap());
pub(super) static SECTION_SUMMARY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".summary, .summarytext").unwrap());
pub(super) static ACTIVITY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li.activity").unwrap());
pub(super) static ACTIVITY_LINK_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"a.aalink[href], .activityinstance a[href], .activityname a[href], a[href*="/mod/"]"#).unwrap()
});
pub(super) static INSTANCE_NAME_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".instancename, .activityname").unwrap());
pub(super) static H5P_IFRAME_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"iframe[src*="h5p/embed.php"], iframe[src*="/mod/hvp/embed.php"]"#).unwrap()
});
pub(super) static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
pub(super) static MAIN_REGION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"#region-main, [role="main"], .page-content"#).unwrap());
static PAGE_CONTENT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".generalbox, #region-main .no-overflow").unwrap());
static FOLDER_FILE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="pluginfile.php"]"#).unwrap());

pub(super) const FALLBACK_SECTION_NAME: &str = "General";
/// 活动页底部的 "上一个/下一个活动" 导航
const NAVIGATION_IDS: &[&str] = &["prev-activity-link", "next-activity-link"];
const NAVIGATION_CLASS: &str = "activity-navigation";

/// 解析课程页时产生的待处理条目
#[derive(Debug, Clone)]
enum PendingEntry {
    Ready(ContentReference),
    /// 文件夹活动，在被取到时才展开
    Folder {
        url: String,
        name: String,
        section_path: Vec<String>,
    },
    /// 单独显示一个章节的页面 (`course/view.php?id=X&section=N`)
    SectionPage { url: String, section_path: Vec<String> },
    /// 页面活动：先产出自身，再扫描正文中的链接
    Page(ContentReference),
}

impl PendingEntry {
    fn from_reference(reference: ContentReference) -> Self {
        match reference.module.as_deref() {
            Some(modules::FOLDER) => PendingEntry::Folder {
                url: reference.url,
                name: reference.display_name,
                section_path: reference.section_path,
            },
            Some(modules::PAGE) => PendingEntry::Page(reference),
            _ => PendingEntry::Ready(reference),
        }
    }
}

/// 链接所在的位置，决定哪些链接会被跟随
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    CoursePage,
    SectionPage,
    /// 页面活动的正文，不再跟随其他页面活动
    PageBody,
}

/// 按页面顺序遍历课程中的可处理条目。
///
/// 课程页在 `open` 时一次性解析；文件夹、章节页和页面活动则在迭代到它们时才去请求。
/// 同一 (URL, 章节路径) 只产出一次，无法识别的条目记入日志后跳过。
pub struct CourseLinkEnumerator {
    course_title: String,
    course_html: String,
    outline: CourseOutline,
    pending: VecDeque<PendingEntry>,
    seen: HashSet<(String, Vec<String>)>,
    /// 已请求过的章节页
    expanded: HashSet<String>,
    failures: Vec<(String, AppError)>,
}

impl CourseLinkEnumerator {
    pub async fn open(handle: &mut SessionHandle, course_url: &str) -> AppResult<Self> {
        info!("=== 解析课程页: {} ===", course_url);
        let page = handle.get_page(course_url).await?;
        Ok(Self::from_page(&page))
    }

    pub fn from_page(page: &ParsedPage) -> Self {
        let course_title = course_title(page);
        let pending: VecDeque<_> = parse_course_page(page).into();
        info!("课程 '{}' 中找到 {} 个候选条目", course_title, pending.len());
        Self {
            outline: CourseOutline::parse(page, &course_title),
            course_title,
            course_html: page.raw.clone(),
            pending,
            seen: HashSet::new(),
            expanded: HashSet::new(),
            failures: Vec::new(),
        }
    }

    pub fn course_title(&self) -> &str {
        &self.course_title
    }

    /// 课程页原始 HTML
    pub fn course_html(&self) -> &str {
        &self.course_html
    }

    pub fn outline(&self) -> &CourseOutline {
        &self.outline
    }

    /// 尚未产出的条目数 (未展开的文件夹和章节页按一个计)
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// 展开文件夹或章节页时遇到的非致命错误 (页面地址, 错误)
    pub fn take_failures(&mut self) -> Vec<(String, AppError)> {
        std::mem::take(&mut self.failures)
    }

    pub async fn next(&mut self, handle: &mut SessionHandle) -> AppResult<Option<ContentReference>> {
        while let Some(entry) = self.pending.pop_front() {
            match entry {
                PendingEntry::Ready(reference) => {
                    if self.first_sighting(&reference) {
                        return Ok(Some(reference));
                    }
                    debug!("重复条目，跳过: {}", reference.url);
                }
                PendingEntry::Page(reference) => {
                    if !self.first_sighting(&reference) {
                        debug!("重复页面，跳过: {}", reference.url);
                        continue;
                    }
                    match self.expand_page(handle, &reference).await {
                        Ok(entries) => self.push_front_all(entries),
                        Err(e) if e.is_fatal() => return Err(e),
                        // 页面本身处理时会再次请求，失败记在该条目上
                        Err(e) => debug!("页面 '{}' 无法展开: {}", reference.url, e),
                    }
                    return Ok(Some(reference));
                }
                PendingEntry::Folder { url, name, section_path } => {
                    match self.expand_folder(handle, &url, &name, &section_path).await {
                        Ok(files) => self.push_front_all(files.into_iter().map(PendingEntry::Ready).collect()),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            warn!("展开文件夹 '{}' 失败: {}", url, e);
                            self.failures.push((url, e));
                        }
                    }
                }
                PendingEntry::SectionPage { url, section_path } => {
                    if !self.expanded.insert(url.clone()) {
                        debug!("章节页已展开过: {}", url);
                        continue;
                    }
                    match self.expand_section_page(handle, &url, &section_path).await {
                        Ok(entries) => self.push_front_all(entries),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            warn!("展开章节页 '{}' 失败: {}", url, e);
                            self.failures.push((url, e));
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    /// 消耗整个序列
    pub async fn collect_all(&mut self, handle: &mut SessionHandle) -> AppResult<Vec<ContentReference>> {
        let mut refs = Vec::new();
        while let Some(reference) = self.next(handle).await? {
            refs.push(reference);
        }
        Ok(refs)
    }

    fn first_sighting(&mut self, reference: &ContentReference) -> bool {
        let (url, section_path) = reference.identity();
        self.seen.insert((url.to_string(), section_path.to_vec()))
    }

    fn push_front_all(&mut self, entries: Vec<PendingEntry>) {
        for entry in entries.into_iter().rev() {
            self.pending.push_front(entry);
        }
    }

    async fn expand_folder(
        &self,
        handle: &mut SessionHandle,
        url: &str,
        name: &str,
        section_path: &[String],
    ) -> AppResult<Vec<ContentReference>> {
        debug!("展开文件夹: {}", url);
        let page = handle.get_page(url).await?;
        let mut path = section_path.to_vec();
        path.push(utils::sanitize_filename(name));
        let files = parse_folder_page(&page, &path);
        info!("文件夹 '{}' 包含 {} 个文件", name, files.len());
        Ok(files)
    }

    async fn expand_section_page(
        &self,
        handle: &mut SessionHandle,
        url: &str,
        section_path: &[String],
    ) -> AppResult<Vec<PendingEntry>> {
        debug!("展开章节页: {}", url);
        let page = handle.get_page(url).await?;
        let entries = parse_section_page(&page, section_path);
        info!("章节页 '{}' 中找到 {} 个候选条目", section_path.join("/"), entries.len());
        Ok(entries)
    }

    async fn expand_page(
        &self,
        handle: &mut SessionHandle,
        reference: &ContentReference,
    ) -> AppResult<Vec<PendingEntry>> {
        let page = handle.get_page(&reference.url).await?;
        let mut path = reference.section_path.clone();
        path.push(utils::sanitize_filename(&reference.display_name));
        let entries = parse_page_activity(&page, &path);
        if !entries.is_empty() {
            info!("页面 '{}' 中找到 {} 个链接条目", reference.display_name, entries.len());
        }
        Ok(entries)
    }
}

fn course_title(page: &ParsedPage) -> String {
    page.title()
        .map(|t| t.trim_start_matches("Course:").trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| {
            let id = page
                .url
                .query_pairs()
                .find(|(k, _)| k == "id")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_else(|| "unknown".to_string());
            format!("course-{}", id)
        })
}

fn has_class(el: &ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

pub(super) fn strip_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segs| segs.next_back())
        .map(|last| percent_encoding::percent_decode_str(last).decode_utf8_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "file".to_string())
}

pub(super) fn section_name(section: ElementRef<'_>, index: usize) -> String {
    section
        .value()
        .attr("data-sectionname")
        .map(utils::normalize_whitespace)
        .or_else(|| section.select(&SECTION_NAME_SEL).next().map(visible_text))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("Section {}", index))
}

pub(super) fn numbered_section(index: usize, name: &str) -> String {
    format!("{:02} - {}", index, utils::sanitize_filename(name))
}

/// 顶层章节，子章节的活动已经包含在外层章节中
pub(super) fn top_level_sections(page: &ParsedPage) -> Vec<ElementRef<'_>> {
    page.select(&SECTION_SEL)
        .filter(|s| {
            !s.ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| a.value().name() == "li" && (has_class(&a, "section") || has_class(&a, "course-section")))
        })
        .collect()
}

/// 章节中指向单独章节页的链接
pub(super) fn section_link(page: &ParsedPage, section: ElementRef<'_>) -> Option<Url> {
    section
        .select(&ANCHOR_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| page.resolve(href))
        .map(strip_fragment)
        .find(classify::is_section_page)
}

fn parse_course_page(page: &ParsedPage) -> Vec<PendingEntry> {
    let sections = top_level_sections(page);
    if sections.is_empty() {
        debug!("页面没有章节结构，改为扫描主区域中的全部链接");
        return parse_flat_page(page);
    }

    let mut entries = Vec::new();
    for (index, section) in sections.into_iter().enumerate() {
        let name = section_name(section, index);
        let section_path = vec![numbered_section(index, &name)];
        debug!("章节 {}: {}", index, name);
        entries.extend(section_entries(page, section, &section_path, Region::CoursePage));
    }
    entries
}

fn section_entries(
    page: &ParsedPage,
    section: ElementRef<'_>,
    section_path: &[String],
    region: Region,
) -> Vec<PendingEntry> {
    let mut entries = Vec::new();
    for summary in section.select(&SECTION_SUMMARY_SEL) {
        entries.extend(inline_entries(page, summary, None, section_path));
    }
    let mut activities = 0;
    for activity in section.select(&ACTIVITY_SEL) {
        activities += 1;
        entries.extend(activity_entries(page, activity, section_path));
    }
    // 每页只显示一个章节的课程，章节里只有一个指向章节页的链接
    if activities == 0 && region == Region::CoursePage {
        if let Some(url) = section_link(page, section) {
            debug!("章节 '{}' 的内容在单独的页面上: {}", section_path.join("/"), url);
            entries.push(PendingEntry::SectionPage {
                url: url.to_string(),
                section_path: section_path.to_vec(),
            });
        }
    }
    entries
}

/// 章节页上只取地址指定的那个章节；找不到时取全部章节
fn parse_section_page(page: &ParsedPage, section_path: &[String]) -> Vec<PendingEntry> {
    let sections = top_level_sections(page);
    let wanted = classify::section_number(&page.url).map(|n| format!("section-{}", n));
    let chosen: Vec<_> = sections
        .iter()
        .copied()
        .filter(|s| wanted.is_some() && s.value().id() == wanted.as_deref())
        .collect();
    let chosen = if chosen.is_empty() { sections } else { chosen };

    if chosen.is_empty() {
        let scope = page.select_first(&MAIN_REGION_SEL).unwrap_or_else(|| page.html.root_element());
        return scan_region(page, scope, section_path, Region::SectionPage);
    }
    chosen
        .into_iter()
        .flat_map(|section| section_entries(page, section, section_path, Region::SectionPage))
        .collect()
}

/// 页面活动正文中的链接，放在以页面命名的子目录下
fn parse_page_activity(page: &ParsedPage, section_path: &[String]) -> Vec<PendingEntry> {
    let scope = page
        .select_first(&PAGE_CONTENT_SEL)
        .or_else(|| page.select_first(&MAIN_REGION_SEL))
        .unwrap_or_else(|| page.html.root_element());
    scan_region(page, scope, section_path, Region::PageBody)
}

fn activity_entries(page: &ParsedPage, activity: ElementRef<'_>, section_path: &[String]) -> Vec<PendingEntry> {
    let modtype = activity.value().attr("class").and_then(classify::module_from_class);
    let link = activity
        .select(&ACTIVITY_LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| page.resolve(href))
        .next()
        .map(strip_fragment);
    let markup = EntryMarkup {
        url: link.clone(),
        modtype: modtype.clone(),
        embeds_h5p: activity.select(&H5P_IFRAME_SEL).next().is_some(),
    };
    let classification = classify::classify(&markup);

    let Some(url) = link else {
        // 标签等没有独立页面的活动：处理正文中内嵌的内容
        return inline_entries(page, activity, modtype, section_path);
    };

    let display_name = activity
        .select(&INSTANCE_NAME_SEL)
        .next()
        .map(visible_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| file_name_from_url(&url));

    if classification.kind == ContentKind::Unknown {
        debug!(
            "跳过不支持的条目 '{}' ({}): {}",
            display_name,
            classification.module.as_deref().unwrap_or("?"),
            url
        );
        return Vec::new();
    }
    vec![PendingEntry::from_reference(ContentReference {
        url: url.to_string(),
        kind: classification.kind,
        display_name,
        section_path: section_path.to_vec(),
        module: classification.module,
    })]
}

/// 内嵌在正文中的 H5P 播放器和直接文件链接
fn inline_entries(
    page: &ParsedPage,
    container: ElementRef<'_>,
    module: Option<String>,
    section_path: &[String],
) -> Vec<PendingEntry> {
    let mut entries = Vec::new();

    for iframe in container.select(&H5P_IFRAME_SEL) {
        let Some(url) = iframe.value().attr("src").and_then(|s| page.resolve(s)) else { continue };
        let url = strip_fragment(url);
        let display_name = iframe
            .value()
            .attr("title")
            .map(utils::normalize_whitespace)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| embedded_package_name(&url));
        entries.push(PendingEntry::Ready(ContentReference {
            url: url.to_string(),
            kind: ContentKind::H5P,
            display_name,
            section_path: section_path.to_vec(),
            module: module.clone(),
        }));
    }

    for anchor in container.select(&ANCHOR_SEL) {
        let Some(url) = anchor.value().attr("href").and_then(|h| page.resolve(h)) else { continue };
        let url = strip_fragment(url);
        if !classify::is_direct_file(&url) {
            continue;
        }
        let text = visible_text(anchor);
        let display_name = if text.is_empty() { file_name_from_url(&url) } else { text };
        entries.push(PendingEntry::Ready(ContentReference {
            url: url.to_string(),
            kind: ContentKind::Resource,
            display_name,
            section_path: section_path.to_vec(),
            module: None,
        }));
    }
    entries
}

/// `h5p/embed.php?url=<包地址>` 中包地址的文件名
fn embedded_package_name(embed_url: &Url) -> String {
    embed_url
        .query_pairs()
        .find(|(k, _)| k == "url")
        .and_then(|(_, v)| Url::parse(&v).ok())
        .map(|package| file_name_from_url(&package))
        .map(|name| name.trim_end_matches(".h5p").to_string())
        .unwrap_or_else(|| "h5p".to_string())
}

fn parse_flat_page(page: &ParsedPage) -> Vec<PendingEntry> {
    let section_path = vec![numbered_section(0, FALLBACK_SECTION_NAME)];
    let scope = page.select_first(&MAIN_REGION_SEL).unwrap_or_else(|| page.html.root_element());
    scan_region(page, scope, &section_path, Region::CoursePage)
}

fn in_navigation(anchor: ElementRef<'_>) -> bool {
    anchor.value().id().is_some_and(|id| NAVIGATION_IDS.contains(&id))
        || anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| has_class(&a, NAVIGATION_CLASS))
}

/// 没有章节结构的区域：按链接地址分类收集条目
fn scan_region(page: &ParsedPage, scope: ElementRef<'_>, section_path: &[String], region: Region) -> Vec<PendingEntry> {
    let mut entries = inline_entries(page, scope, None, section_path)
        .into_iter()
        .filter(|e| matches!(e, PendingEntry::Ready(r) if r.kind == ContentKind::H5P))
        .collect::<Vec<_>>();
    let own_url = strip_fragment(page.url.clone());
    let mut section_links = 0;

    for anchor in scope.select(&ANCHOR_SEL) {
        if in_navigation(anchor) {
            continue;
        }
        let Some(url) = anchor.value().attr("href").and_then(|h| page.resolve(h)) else { continue };
        let url = strip_fragment(url);
        if url == own_url {
            continue;
        }
        let text = visible_text(anchor);
        let display_name = if text.is_empty() { file_name_from_url(&url) } else { text };

        if classify::is_section_page(&url) {
            if region == Region::CoursePage {
                section_links += 1;
                let index = classify::section_number(&url).unwrap_or(section_links);
                entries.push(PendingEntry::SectionPage {
                    url: url.to_string(),
                    section_path: vec![numbered_section(index, &display_name)],
                });
            }
            continue;
        }

        let classification = classify::classify_url(&url);
        if classification.kind == ContentKind::Unknown {
            continue;
        }
        if region == Region::PageBody && classification.module.as_deref() == Some(modules::PAGE) {
            debug!("页面正文中的其他页面不再跟随: {}", url);
            continue;
        }
        entries.push(PendingEntry::from_reference(ContentReference {
            url: url.to_string(),
            kind: classification.kind,
            display_name,
            section_path: section_path.to_vec(),
            module: classification.module,
        }));
    }
    entries
}

fn parse_folder_page(page: &ParsedPage, section_path: &[String]) -> Vec<ContentReference> {
    let scope = page.select_first(&MAIN_REGION_SEL).unwrap_or_else(|| page.html.root_element());
    scope
        .select(&FOLDER_FILE_SEL)
        .filter_map(|a| {
            let url = strip_fragment(page.resolve(a.value().attr("href")?)?);
            let text = visible_text(a);
            let display_name = if text.is_empty() { file_name_from_url(&url) } else { text };
            Some(ContentReference {
                url: url.to_string(),
                kind: ContentKind::Resource,
                display_name,
                section_path: section_path.to_vec(),
                module: None,
            })
        })
        .collect()
}
