// src/workflows.rs

use crate::{
    config::{AppConfig, credentials::Credentials},
    constants,
    crawler::CourseLinkEnumerator,
    downloader::{ArtifactWriter, Dispatcher, DownloadManager},
    error::AppResult,
    models::ContentKind,
    session::{SessionAuthenticator, SessionHandle},
    symbols, ui, utils,
};
use log::{debug, info, warn};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// 一次课程镜像任务的输入
#[derive(Debug, Clone)]
pub struct CourseJob {
    pub login_url: String,
    pub course_url: String,
    pub output: PathBuf,
    pub kinds: Vec<ContentKind>,
    /// 是否显示进度条
    pub show_progress: bool,
}

/// 登录、枚举课程条目并逐个处理。
///
/// 登录失败和重新登录失败会立即返回错误；单个条目的失败记入返回的 `DownloadManager`。
pub async fn run_course(
    config: Arc<AppConfig>,
    credentials: Credentials,
    job: &CourseJob,
) -> AppResult<DownloadManager> {
    let authenticator = SessionAuthenticator::new(&job.login_url, credentials, config.clone())?;
    let mut handle = SessionHandle::login(authenticator).await?;
    info!("登录成功: {}", job.login_url);
    ui::ok("登录成功");

    let mut enumerator = CourseLinkEnumerator::open(&mut handle, &job.course_url).await?;
    let course_dir = course_output_dir(&job.output, enumerator.course_title());
    let writer = ArtifactWriter::new(course_dir)?;
    info!("输出目录: {}", writer.root().display());
    ui::info(&format!(
        "课程 '{}' 将保存到 {} (按 {} 可随时退出)",
        enumerator.course_title(),
        writer.root().display(),
        *symbols::CTRL_C
    ));

    let dispatcher = Dispatcher::new(&config);
    let mut manager = DownloadManager::new();
    manager.start_batch(enumerator.course_title());
    save_overview(
        &writer,
        &mut manager,
        constants::COURSE_OVERVIEW_HTML,
        enumerator.course_html().as_bytes(),
    );

    let pbar = job.show_progress.then(|| {
        let prefix = utils::truncate_text(enumerator.course_title(), constants::PROGRESS_PREFIX_WIDTH);
        ui::new_tasks_progress_bar(enumerator.remaining() as u64, &prefix)
    });

    while let Some(reference) = enumerator.next(&mut handle).await? {
        if let Some(pbar) = &pbar {
            pbar.set_length(pbar.position() + 1 + enumerator.remaining() as u64);
        }
        if job.kinds.contains(&reference.kind) {
            dispatcher
                .dispatch(&mut handle, &reference, &writer, &mut manager)
                .await?;
        } else {
            debug!("条目类型 {} 不在本次任务范围内: {}", reference.kind, reference.url);
        }
        if let Some(pbar) = &pbar {
            pbar.inc(1);
        }
    }
    if let Some(pbar) = pbar {
        pbar.finish_and_clear();
    }

    for (url, error) in enumerator.take_failures() {
        manager.record_orphan_failure(&url, &error);
    }

    dispatcher.finish(&writer, &mut manager);
    let overview = enumerator.outline().to_markdown(|url| {
        manager
            .artifacts_for(url)
            .first()
            .map(|path| utils::relative_display(writer.root(), path))
    });
    save_overview(&writer, &mut manager, constants::COURSE_OVERVIEW_MD, overview.as_bytes());

    if handle.reauth_count() > 0 {
        info!("本次运行共重新登录 {} 次", handle.reauth_count());
    }
    Ok(manager)
}

/// 课程根目录下的概览文件，写失败不影响本次运行
fn save_overview(writer: &ArtifactWriter, manager: &mut DownloadManager, name: &str, content: &[u8]) {
    match writer.write_bytes(&[], name, content) {
        Ok(file) => manager.record_artifacts(None, &[file]),
        Err(e) => warn!("写出 {} 失败: {}", name, e),
    }
}

fn course_output_dir(output: &Path, course_title: &str) -> PathBuf {
    output.join(utils::sanitize_filename(course_title))
}
