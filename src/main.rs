// src/main.rs

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use moodle_dl::{cli::Cli, logging, run_from_cli};
use std::{env, time::Duration};

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    {
        colored::control::set_virtual_terminal(true).ok();
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n{} 用户强制中断程序。", "[!]".yellow());
            tokio::time::sleep(Duration::from_millis(100)).await;
            std::process::exit(130);
        }
    });

    let bin_name = env::var("CARGO_BIN_NAME").unwrap_or_else(|_| "moodle-dl".to_string());
    let after_help = format!(
        "示例:\n  # 下载课程文件和 H5P 活动\n  {bin} resources --login-url \"https://moodle.example.com/login/index.php\" --course-url \"https://moodle.example.com/course/view.php?id=42\"\n\n  # 只导出已有的测验回顾，不开始新的作答\n  {bin} quizzes --login-url ... --course-url ... --no-new-attempts\n\n  # 从凭据文件读取登录信息并镜像整个课程\n  {bin} all --login-url ... --course-url ... -c creds.txt -o ./mirror",
        bin = bin_name
    );

    let cmd = Cli::command().after_help(after_help);
    let args = match Cli::from_arg_matches(&cmd.get_matches()) {
        Ok(args) => args,
        Err(e) => e.exit(),
    };

    logging::init_logger(args.log_level);

    if let Err(e) = run_from_cli(args).await {
        log::error!("程序执行出错: {}", e);
        eprintln!("\n{} {}", "[X]".red(), format!("程序执行出错: {}", e).red());
        std::process::exit(1);
    }
}
