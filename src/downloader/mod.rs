// src/downloader/mod.rs

mod dispatcher;
mod resource;
mod writer;

pub use dispatcher::Dispatcher;
pub use resource::ResourceDownloader;
pub(crate) use resource::save_url;
pub use writer::{ArtifactWriter, PendingFile};

use crate::{
    error::AppError,
    models::{ContentReference, DownloadStatus, WrittenFile},
    symbols, ui,
};
use colored::*;
use log::{error, info};
use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub total: usize,
    pub success: usize,
    pub reused: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// 报告中的一行：条目名称、地址和原因
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportEntry {
    pub name: String,
    pub url: String,
    pub reason: String,
}

impl ReportEntry {
    fn new(reference: &ContentReference, reason: impl Into<String>) -> Self {
        let mut name = reference.section_path.join("/");
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(&reference.display_name);
        Self {
            name,
            url: reference.url.clone(),
            reason: reason.into(),
        }
    }
}

/// 整次运行的结果统计。流水线是顺序执行的，只有一个所有者。
#[derive(Debug, Default)]
pub struct DownloadManager {
    stats: DownloadStats,
    written: Vec<WrittenFile>,
    /// 条目地址 -> 本地产物，用于课程概览中的本地链接
    artifacts: HashMap<String, Vec<PathBuf>>,
    failed: Vec<ReportEntry>,
    skipped: Vec<ReportEntry>,
}

impl DownloadManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 课程条目是惰性枚举的，总数随记录累加
    pub fn start_batch(&mut self, course_title: &str) {
        info!("开始处理课程 '{}'", course_title);
        *self = Self::default();
    }

    pub fn record_written(&mut self, reference: &ContentReference, files: &[WrittenFile]) {
        let status = DownloadStatus::for_written(files);
        let (_, _, msg) = status.get_display_info();
        info!("'{}' {} ({} 个文件)", reference.display_name, msg, files.len());
        self.stats.total += 1;
        match status {
            DownloadStatus::Reused => self.stats.reused += 1,
            _ => self.stats.success += 1,
        }
        self.record_artifacts(Some(&reference.url), files);
    }

    pub fn record_skip(&mut self, reference: &ContentReference, reason: &str) {
        let (_, _, msg) = DownloadStatus::Skipped.get_display_info();
        info!("{} '{}'，原因: {}", msg, reference.display_name, reason);
        self.stats.total += 1;
        self.stats.skipped += 1;
        self.skipped.push(ReportEntry::new(reference, reason));
    }

    /// 不计入统计的产物 (快照页面、汇总文件、课程概览)
    pub fn record_artifacts(&mut self, url: Option<&str>, files: &[WrittenFile]) {
        if let Some(url) = url {
            self.artifacts
                .entry(url.to_string())
                .or_default()
                .extend(files.iter().map(|f| f.path.clone()));
        }
        self.written.extend_from_slice(files);
    }

    /// 某个条目地址对应的本地文件，按写入顺序
    pub fn artifacts_for(&self, url: &str) -> &[PathBuf] {
        self.artifacts.get(url).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record_failure(&mut self, reference: &ContentReference, error: &AppError) {
        let status = DownloadStatus::from(error);
        error!("'{}' 处理失败，状态: {:?}，错误: {}", reference.url, status, error);
        self.stats.total += 1;
        self.stats.failed += 1;
        let (_, _, msg) = status.get_display_info();
        self.failed.push(ReportEntry::new(reference, msg));
    }

    /// 不属于任何条目的失败 (例如文件夹展开失败)
    pub fn record_orphan_failure(&mut self, url: &str, error: &AppError) {
        error!("'{}' 处理失败: {}", url, error);
        self.stats.total += 1;
        self.stats.failed += 1;
        let (_, _, msg) = DownloadStatus::from(error).get_display_info();
        self.failed.push(ReportEntry {
            name: url.to_string(),
            url: url.to_string(),
            reason: msg.to_string(),
        });
    }

    pub fn get_stats(&self) -> DownloadStats {
        self.stats.clone()
    }

    pub fn written_files(&self) -> &[WrittenFile] {
        &self.written
    }

    pub fn failures(&self) -> &[ReportEntry] {
        &self.failed
    }

    pub fn skipped(&self) -> &[ReportEntry] {
        &self.skipped
    }

    pub fn did_all_succeed(&self) -> bool {
        self.stats.failed == 0
    }

    pub fn print_report(&self) {
        let stats = &self.stats;
        info!(
            "处理报告: Total={}, Success={}, Reused={}, Skipped={}, Failed={}",
            stats.total, stats.success, stats.reused, stats.skipped, stats.failed
        );

        if !self.skipped.is_empty() || !self.failed.is_empty() {
            ui::print_sub_header("详情报告");
            if !self.skipped.is_empty() {
                let (symbol, _, _) = DownloadStatus::Skipped.get_display_info();
                println!("\n{} 跳过的条目 ({}个):", symbol, stats.skipped);
                print_grouped_report(&self.skipped, |s| s.cyan());
            }
            if !self.failed.is_empty() {
                println!("\n{} 失败的条目 ({}个):", *symbols::ERROR, stats.failed);
                print_grouped_report(&self.failed, |s| s.red());
            }
        }
        ui::print_sub_header("任务总结");
        if stats.total > 0 && stats.failed == 0 {
            println!(
                "{} 全部 {} 个条目处理完成 ({} 个内容未变化，{} 个已跳过)。",
                *symbols::OK,
                stats.total,
                stats.reused,
                stats.skipped
            );
        } else {
            let summary = format!(
                "{} | {} | {} | {}",
                format!("成功: {}", stats.success).green(),
                format!("未变化: {}", stats.reused).green(),
                format!("失败: {}", stats.failed).red(),
                format!("跳过: {}", stats.skipped).yellow()
            );
            println!("{}", summary);
        }
    }
}

fn print_grouped_report(items: &[ReportEntry], color_fn: fn(ColoredString) -> ColoredString) {
    let mut grouped: BTreeMap<&str, Vec<&ReportEntry>> = BTreeMap::new();
    for item in items {
        grouped.entry(item.reason.as_str()).or_default().push(item);
    }
    for (reason, mut entries) in grouped {
        println!("  - {}", color_fn(format!("原因: {}", reason).into()));
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        for entry in entries {
            println!("    - {} ({})", entry.name, entry.url.dimmed());
        }
    }
}
