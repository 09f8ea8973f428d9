// src/downloader/dispatcher.rs

use super::{DownloadManager, ResourceDownloader, writer::ArtifactWriter};
use crate::{
    config::AppConfig,
    error::AppResult,
    extractor::{ContentExtractor, H5pExtractor, QuizExtractor},
    models::{ContentReference, ExtractOutcome},
};
use log::{debug, warn};

/// 按内容类型把引用交给对应的组件，并在这里吸收所有非致命错误。
pub struct Dispatcher {
    extractors: Vec<Box<dyn ContentExtractor>>,
}

impl Dispatcher {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_extractors(vec![
            Box::new(ResourceDownloader::new()),
            Box::new(QuizExtractor::new(config.start_new_attempts)),
            Box::new(H5pExtractor::new()),
        ])
    }

    pub fn with_extractors(extractors: Vec<Box<dyn ContentExtractor>>) -> Self {
        Self { extractors }
    }

    /// 处理单个引用。只有认证类错误会返回 Err，其余失败记入报告后继续。
    pub async fn dispatch(
        &self,
        handle: &mut crate::session::SessionHandle,
        reference: &ContentReference,
        writer: &ArtifactWriter,
        manager: &mut DownloadManager,
    ) -> AppResult<()> {
        let Some(extractor) = self.extractors.iter().find(|e| e.kind() == reference.kind) else {
            manager.record_skip(reference, &format!("不支持的内容类型: {}", reference.kind));
            return Ok(());
        };

        debug!("处理 [{}] '{}': {}", reference.kind, reference.display_name, reference.url);
        match extractor.extract(handle, reference, writer).await {
            Ok(ExtractOutcome::Written(files)) => manager.record_written(reference, &files),
            Ok(ExtractOutcome::Unavailable { reason, captured }) => {
                manager.record_skip(reference, &reason);
                manager.record_artifacts(Some(&reference.url), &captured);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("'{}' 处理失败 ({}): {}", reference.display_name, reference.url, e);
                manager.record_failure(reference, &e);
            }
        }
        Ok(())
    }

    /// 让各组件写出汇总文件，汇总不计入条目统计
    pub fn finish(&self, writer: &ArtifactWriter, manager: &mut DownloadManager) {
        for extractor in &self.extractors {
            match extractor.finish(writer) {
                Ok(files) => manager.record_artifacts(None, &files),
                Err(e) => warn!("写出 {} 汇总失败: {}", extractor.kind(), e),
            }
        }
    }
}
