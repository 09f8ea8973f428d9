// tests/common/mod.rs
#![allow(dead_code)]

use mockito::{Matcher, Mock, ServerGuard};
use moodle_dl::{
    config::{AppConfig, credentials::Credentials},
    models::{ContentKind, ContentReference},
    session::{SessionAuthenticator, SessionHandle},
};
use std::sync::Arc;

pub const HTML: &str = "text/html; charset=utf-8";

pub const LOGIN_FORM: &str = r#"<html><body>
<form class="login-form" id="login" action="/login/index.php" method="post">
  <input type="hidden" name="logintoken" value="tok-123">
  <input type="text" name="username"><input type="password" name="password">
</form></body></html>"#;

pub const DASHBOARD: &str = r#"<html><body><h1>Tableau de bord</h1>
<a href="/login/logout.php?sesskey=abc">Déconnexion</a></body></html>"#;

pub fn config() -> Arc<AppConfig> {
    Arc::new(AppConfig::default())
}

pub fn credentials() -> Credentials {
    Credentials::new("alice", "s3cret")
}

/// 登录页 GET 与表单 POST，各期望被调用 `times` 次
pub async fn mock_login(server: &mut ServerGuard, times: usize) -> (Mock, Mock) {
    let get = server
        .mock("GET", "/login/index.php")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(LOGIN_FORM)
        .expect(times)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/login/index.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("username".into(), "alice".into()),
            Matcher::UrlEncoded("password".into(), "s3cret".into()),
            Matcher::UrlEncoded("logintoken".into(), "tok-123".into()),
        ]))
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(DASHBOARD)
        .expect(times)
        .create_async()
        .await;
    (get, post)
}

pub async fn login(server: &ServerGuard) -> SessionHandle {
    let authenticator =
        SessionAuthenticator::new(&format!("{}/login/index.php", server.url()), credentials(), config())
            .unwrap();
    SessionHandle::login(authenticator).await.expect("login should succeed")
}

pub async fn mock_html(server: &mut ServerGuard, path: impl Into<Matcher>, body: &str) -> Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(body)
        .create_async()
        .await
}

pub async fn mock_file(server: &mut ServerGuard, path: impl Into<Matcher>, content_type: &str, body: &[u8]) -> Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", content_type)
        .with_body(body)
        .create_async()
        .await
}

/// 以路径前缀匹配 (忽略查询串)
pub fn path_prefix(path: &str) -> Matcher {
    Matcher::Regex(format!("^{}", regex::escape(path)))
}

pub fn reference(url: String, kind: ContentKind, name: &str, module: Option<&str>) -> ContentReference {
    ContentReference {
        url,
        kind,
        display_name: name.to_string(),
        section_path: vec!["01 - Semaine 1".to_string()],
        module: module.map(str::to_string),
    }
}
