// src/extractor/mod.rs

pub mod h5p;
mod h5p_render;
pub mod quiz;
mod quiz_flow;
mod quiz_parser;

pub use h5p::H5pExtractor;
pub use quiz::QuizExtractor;
pub use quiz_flow::{QuizEvent, QuizState};

use crate::{
    downloader::ArtifactWriter,
    error::AppResult,
    models::{ContentKind, ContentReference, ExtractOutcome, WrittenFile},
    session::SessionHandle,
};
use async_trait::async_trait;

/// 处理某一类内容引用的组件。
///
/// 解析后的页面 (`scraper::Html`) 不能跨线程移动，流水线又是严格顺序执行的，
/// 所以这里不要求 `Send`。
#[async_trait(?Send)]
pub trait ContentExtractor {
    fn kind(&self) -> ContentKind;

    async fn extract(
        &self,
        handle: &mut SessionHandle,
        reference: &ContentReference,
        writer: &ArtifactWriter,
    ) -> AppResult<ExtractOutcome>;

    /// 全部条目处理完后调用一次，写出跨条目的汇总文件
    fn finish(&self, _writer: &ArtifactWriter) -> AppResult<Vec<WrittenFile>> {
        Ok(Vec::new())
    }
}
