// src/cli.rs

use crate::{constants, models::ContentKind};
use clap::{Args, Parser, Subcommand, ValueEnum, crate_version};
use std::path::PathBuf;

/// 定义日志输出级别
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = clap::crate_name!(),
    version = crate_version!(),
    about = "登录 Moodle 并将单个课程的文件、测验和 H5P 活动镜像到本地磁盘",
    long_about = None,
    arg_required_else_help = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// (隐藏参数) 设置日志文件的输出级别，用于调试
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true, hide = true)]
    pub log_level: LogLevel,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// 下载课程中的文件、链接、页面和 H5P 活动
    Resources(CourseArgs),
    /// 导出课程中的测验题目 (以及平台公开的正确答案)
    Quizzes(QuizArgs),
    /// 一次性处理所有内容类型
    All(QuizArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CourseArgs {
    /// Moodle 登录页地址 (例如 https://moodle.example.com/login/index.php)
    #[arg(long, value_name = "URL")]
    pub login_url: String,
    /// 课程页地址 (例如 https://moodle.example.com/course/view.php?id=123)
    #[arg(long, value_name = "URL")]
    pub course_url: String,
    /// 凭据文件 (每行 key=value，键为 username 和 password)
    #[arg(short, long, value_name = "FILE")]
    pub credentials: Option<PathBuf>,
    /// 设置文件保存目录
    #[arg(short, long, value_name = "DIR", default_value_os_t = PathBuf::from(constants::DEFAULT_SAVE_DIR))]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct QuizArgs {
    #[command(flatten)]
    pub course: CourseArgs,
    /// 不为没有可查看记录的测验开始新的作答
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_new_attempts: bool,
}

impl Command {
    pub fn course_args(&self) -> &CourseArgs {
        match self {
            Command::Resources(args) => args,
            Command::Quizzes(args) | Command::All(args) => &args.course,
        }
    }

    pub fn no_new_attempts(&self) -> bool {
        match self {
            Command::Resources(_) => false,
            Command::Quizzes(args) | Command::All(args) => args.no_new_attempts,
        }
    }

    /// 该命令负责处理的内容类型
    pub fn kinds(&self) -> &'static [ContentKind] {
        match self {
            Command::Resources(_) => &[ContentKind::Resource, ContentKind::H5P],
            Command::Quizzes(_) => &[ContentKind::Quiz],
            Command::All(_) => &[ContentKind::Resource, ContentKind::Quiz, ContentKind::H5P],
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Command::Resources(_) => "下载课程资源",
            Command::Quizzes(_) => "导出课程测验",
            Command::All(_) => "镜像整个课程",
        }
    }
}
