// src/crawler/outline.rs

use super::{
    classify,
    course::{
        ACTIVITY_LINK_SEL, ACTIVITY_SEL, ANCHOR_SEL, FALLBACK_SECTION_NAME, H5P_IFRAME_SEL, INSTANCE_NAME_SEL,
        MAIN_REGION_SEL, SECTION_SUMMARY_SEL, numbered_section, section_link, section_name, strip_fragment,
        top_level_sections,
    },
};
use crate::{
    models::ContentKind,
    session::{ParsedPage, visible_text},
    utils,
};
use scraper::ElementRef;

/// 没有名称的活动 (例如标签) 取正文开头作为标题
const LABEL_WIDTH: usize = 80;

/// 课程页的结构概览，写成 course_overview.md
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseOutline {
    pub title: String,
    pub source_url: String,
    pub sections: Vec<OutlineSection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineSection {
    /// 与输出目录一致的章节名 (`NN - 名称`)
    pub dir: String,
    pub summary: String,
    pub items: Vec<OutlineItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineItem {
    pub label: String,
    pub url: Option<String>,
    pub module: Option<String>,
}

impl CourseOutline {
    pub fn parse(page: &ParsedPage, title: &str) -> Self {
        let sections = top_level_sections(page);
        let sections = if sections.is_empty() {
            vec![flat_section(page)]
        } else {
            sections
                .into_iter()
                .enumerate()
                .map(|(index, section)| outline_section(page, section, index))
                .collect()
        };
        Self {
            title: title.to_string(),
            source_url: page.url.to_string(),
            sections,
        }
    }

    /// `local` 把条目地址映射到课程目录下的相对路径；映射不到的条目链接回平台
    pub fn to_markdown(&self, local: impl Fn(&str) -> Option<String>) -> String {
        let mut out = vec![
            format!("# {}", self.title),
            String::new(),
            format!("- 来源: <{}>", self.source_url),
        ];
        for section in &self.sections {
            out.push(String::new());
            out.push(format!("## {}", section.dir));
            if !section.summary.is_empty() {
                out.push(String::new());
                out.push(section.summary.clone());
            }
            if section.items.is_empty() {
                continue;
            }
            out.push(String::new());
            for item in &section.items {
                let label = item.label.replace('[', "\\[").replace(']', "\\]");
                let mut line = match &item.url {
                    Some(url) => match local(url) {
                        Some(path) => format!("- [{}](<{}>)", label, path),
                        None => format!("- [{}]({})", label, url),
                    },
                    None => format!("- {}", label),
                };
                if let Some(module) = &item.module {
                    line.push_str(&format!(" `{}`", module));
                }
                out.push(line);
            }
        }
        let mut doc = out.join("\n");
        doc.push('\n');
        doc
    }
}

fn outline_section(page: &ParsedPage, section: ElementRef<'_>, index: usize) -> OutlineSection {
    let summary = section
        .select(&SECTION_SUMMARY_SEL)
        .map(visible_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let mut items: Vec<OutlineItem> = section
        .select(&ACTIVITY_SEL)
        .filter_map(|activity| outline_item(page, activity))
        .collect();
    if items.is_empty() {
        if let Some(url) = section_link(page, section) {
            items.push(OutlineItem {
                label: "章节页面".to_string(),
                url: Some(url.to_string()),
                module: None,
            });
        }
    }
    OutlineSection {
        dir: numbered_section(index, &section_name(section, index)),
        summary,
        items,
    }
}

fn outline_item(page: &ParsedPage, activity: ElementRef<'_>) -> Option<OutlineItem> {
    let module = activity.value().attr("class").and_then(classify::module_from_class);
    // 标签中的 H5P 以内嵌播放器地址登记
    let url = activity
        .select(&ACTIVITY_LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .chain(activity.select(&H5P_IFRAME_SEL).filter_map(|f| f.value().attr("src")))
        .filter_map(|href| page.resolve(href))
        .map(strip_fragment)
        .next();
    let label = activity
        .select(&INSTANCE_NAME_SEL)
        .next()
        .map(visible_text)
        .or_else(|| activity.select(&H5P_IFRAME_SEL).next().and_then(|f| f.value().attr("title")).map(utils::normalize_whitespace))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| utils::truncate_text(&visible_text(activity), LABEL_WIDTH));
    if label.is_empty() && url.is_none() {
        return None;
    }
    Some(OutlineItem {
        label,
        url: url.map(|u| u.to_string()),
        module,
    })
}

fn flat_section(page: &ParsedPage) -> OutlineSection {
    let scope = page.select_first(&MAIN_REGION_SEL).unwrap_or_else(|| page.html.root_element());
    let items = scope
        .select(&ANCHOR_SEL)
        .filter_map(|anchor| {
            let url = strip_fragment(page.resolve(anchor.value().attr("href")?)?);
            let classification = classify::classify_url(&url);
            if classification.kind == ContentKind::Unknown && !classify::is_section_page(&url) {
                return None;
            }
            Some(OutlineItem {
                label: visible_text(anchor),
                url: Some(url.to_string()),
                module: classification.module,
            })
        })
        .collect();
    OutlineSection {
        dir: numbered_section(0, FALLBACK_SECTION_NAME),
        summary: String::new(),
        items,
    }
}
