// src/constants.rs

pub const UI_WIDTH: usize = 88;
pub const PROGRESS_PREFIX_WIDTH: usize = 32;
pub const MAX_FILENAME_BYTES: usize = 200;
pub const CONFIG_DIR_NAME: &str = concat!(".", clap::crate_name!());
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const LOG_FILE_NAME: &str = concat!(clap::crate_name!(), ".log");
pub const LOG_FALLBACK_FILE_NAME: &str = "fallback.log";
pub const DEFAULT_SAVE_DIR: &str = "downloaded_resources";
/// 课程根目录下的汇总文件
pub const COURSE_OVERVIEW_HTML: &str = "course_overview.html";
pub const COURSE_OVERVIEW_MD: &str = "course_overview.md";
pub const H5P_SUMMARY_MD: &str = "H5P_SUMMARY.md";
pub const H5P_SUMMARY_JSON: &str = "H5P_SUMMARY.json";
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// 下载单个文件的最大尝试次数（含首次）
pub const DOWNLOAD_ATTEMPTS: u32 = 2;
pub const DOWNLOAD_RETRY_DELAY_MS: u64 = 500;
/// 碰撞后缀的上限，超过即视为异常
pub const MAX_COLLISION_SUFFIX: usize = 999;

pub const ENV_USERNAME: &str = "MOODLE_USERNAME";
pub const ENV_PASSWORD: &str = "MOODLE_PASSWORD";

pub const HELP_CREDENTIALS_GUIDE: &str = r#"登录信息按以下顺序查找:
1. --credentials 指定的文件，每行一个 key=value:
     username=你的用户名
     password=你的密码
2. 环境变量 MOODLE_USERNAME 与 MOODLE_PASSWORD
3. 以上都没有时在终端中交互输入

如果学校使用单点登录 (CAS/SAML)，请先在网页上为账号设置 Moodle 本地密码。"#;

pub mod moodle {
    pub const LOGIN_PATH: &str = "/login/index.php";
    pub const COURSE_VIEW: &str = "/course/view.php";
    pub const COURSE_SECTION: &str = "/course/section.php";
    pub const LOGIN_TOKEN_FIELD: &str = "logintoken";
    pub const PLUGINFILE: &str = "pluginfile.php";
    pub const H5P_EMBED: &str = "h5p/embed.php";
    pub const QUIZ_START_ATTEMPT: &str = "startattempt.php";
    pub const QUIZ_PROCESS_ATTEMPT: &str = "processattempt.php";
    pub const QUIZ_REVIEW: &str = "review.php";

    pub mod modules {
        pub const RESOURCE: &str = "resource";
        pub const URL: &str = "url";
        pub const PAGE: &str = "page";
        pub const FOLDER: &str = "folder";
        pub const QUIZ: &str = "quiz";
        pub const HVP: &str = "hvp";
        pub const H5P_ACTIVITY: &str = "h5pactivity";
    }
}

/// 视为“直接文件”的扩展名
pub const FILE_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "zip", "txt",
    "csv", "jpg", "jpeg", "png", "gif", "svg", "mp3", "mp4", "webm", "ogg", "mov", "avi",
    "h5p",
];

/// 题目选项中需要剔除的界面文字
pub const QUIZ_JUNK_PHRASES: &[&str] = &[
    "clear my choice",
    "remove choice",
    "clear selection",
    "effacer mon choix",
    "retirer la marque",
    "marquer la question",
    "flag question",
];

/// 概览页上表示测验已关闭或不可作答的提示
pub const QUIZ_CLOSED_PHRASES: &[&str] = &[
    "this quiz closed",
    "this quiz is not currently available",
    "no more attempts are allowed",
    "ce test est fermé",
    "ce test n'est pas disponible",
    "aucune autre tentative n'est autorisée",
];
