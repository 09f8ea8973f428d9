// src/session/authenticator.rs

use super::{Session, fetcher::is_login_document};
use crate::{
    client::RobustClient,
    config::{AppConfig, credentials::Credentials},
    constants::moodle,
    error::{AppResult, AuthError},
};
use log::{debug, error, info, warn};
use scraper::{Html, Selector};
use std::sync::{Arc, LazyLock};
use url::Url;

static LOGIN_TOKEN_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[name="logintoken"]"#).unwrap());
static LOGIN_FORM_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"form#login, form[action*="login"]"#).unwrap());
static LOGOUT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="login/logout.php"]"#).unwrap());

/// 登录表单中提取出的提交信息
#[derive(Debug, PartialEq, Eq)]
struct LoginForm {
    action: Url,
    token: Option<String>,
}

/// 执行 Moodle 表单登录，产出可复用的已认证会话。本层不做重试。
pub struct SessionAuthenticator {
    login_url: Url,
    credentials: Credentials,
    config: Arc<AppConfig>,
}

impl SessionAuthenticator {
    pub fn new(login_url: &str, credentials: Credentials, config: Arc<AppConfig>) -> AppResult<Self> {
        Ok(Self {
            login_url: Url::parse(login_url)?,
            credentials,
            config,
        })
    }

    pub async fn authenticate(&self) -> Result<Session, AuthError> {
        info!("=== 登录 {} (用户: {}) ===", self.login_url, self.credentials.username());
        let client = RobustClient::new(self.config.clone())
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        let res = client
            .get(self.login_url.clone())
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;
        let login_page_url = res.url().clone();
        let body = res
            .text()
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        let form = parse_login_form(&body, &login_page_url, &self.login_url);
        match &form.token {
            Some(token) => debug!("找到登录令牌: {}...", token.chars().take(8).collect::<String>()),
            None => warn!("登录页中没有找到 logintoken，将不带令牌提交"),
        }

        let mut fields = vec![
            ("username".to_string(), self.credentials.username().to_string()),
            ("password".to_string(), self.credentials.password().to_string()),
            ("anchor".to_string(), String::new()),
        ];
        if let Some(token) = form.token {
            fields.push((moodle::LOGIN_TOKEN_FIELD.to_string(), token));
        }

        debug!("提交登录表单到 {}", form.action);
        let res = client
            .post_form(form.action, &fields)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;
        let landed_on = res.url().clone();
        let body = res
            .text()
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        match check_login_result(&body) {
            LoginResult::StillOnLoginForm => {
                error!("提交后仍然停留在登录表单 ({})，登录失败", landed_on);
                Err(AuthError::InvalidCredentials)
            }
            LoginResult::LoggedIn { logout_link } => {
                if !logout_link {
                    debug!("登录后页面没有注销链接，按成功处理: {}", landed_on);
                }
                info!("登录成功，跳转到: {}", landed_on);
                Ok(Session::new(client, self.login_url.clone()))
            }
        }
    }
}

fn parse_login_form(body: &str, page_url: &Url, fallback: &Url) -> LoginForm {
    let html = Html::parse_document(body);
    let token = html
        .select(&LOGIN_TOKEN_SEL)
        .next()
        .and_then(|el| el.value().attr("value"))
        .map(str::to_string);
    let action = html
        .select(&LOGIN_FORM_SEL)
        .next()
        .and_then(|form| form.value().attr("action"))
        .and_then(|action| page_url.join(action).ok())
        .unwrap_or_else(|| fallback.clone());
    LoginForm { action, token }
}

#[derive(Debug, PartialEq, Eq)]
enum LoginResult {
    StillOnLoginForm,
    LoggedIn { logout_link: bool },
}

fn check_login_result(body: &str) -> LoginResult {
    let html = Html::parse_document(body);
    if is_login_document(&html) {
        return LoginResult::StillOnLoginForm;
    }
    LoginResult::LoggedIn {
        logout_link: html.select(&LOGOUT_SEL).next().is_some(),
    }
}
