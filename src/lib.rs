// src/lib.rs

pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod crawler;
pub mod downloader;
pub mod error;
pub mod extractor;
pub mod logging;
pub mod models;
pub mod session;
pub mod symbols;
pub mod ui;
pub mod utils;
pub mod workflows;

use crate::{
    cli::Cli,
    config::AppConfig,
    error::{AppError, AppResult, AuthError},
    workflows::CourseJob,
};
use colored::*;
use log::{debug, warn};
use std::{io::IsTerminal, sync::Arc};

/// 库的公共入口点，由 `main.rs` 调用
pub async fn run_from_cli(args: Cli) -> AppResult<()> {
    debug!("CLI 参数: {:?}", args);
    let course = args.command.course_args();

    let config = Arc::new(AppConfig::new(&args)?);
    debug!("加载的应用配置: {:?}", config);

    let credentials = config::credentials::resolve_credentials(course.credentials.as_deref())?;

    ui::print_header(args.command.title());
    let job = CourseJob {
        login_url: course.login_url.clone(),
        course_url: course.course_url.clone(),
        output: course.output.clone(),
        kinds: args.command.kinds().to_vec(),
        show_progress: std::io::stderr().is_terminal(),
    };
    let manager = match workflows::run_course(config, credentials, &job).await {
        Err(AppError::Auth(AuthError::InvalidCredentials)) => {
            ui::box_message(
                "登录失败",
                constants::HELP_CREDENTIALS_GUIDE.lines().collect::<Vec<_>>().as_slice(),
                |s| s.yellow(),
            );
            return Err(AuthError::InvalidCredentials.into());
        }
        other => other?,
    };
    manager.print_report();

    // 单个条目失败不影响退出码
    if !manager.did_all_succeed() {
        warn!("{} 个条目处理失败，详情见上方报告", manager.get_stats().failed);
    }
    Ok(())
}
