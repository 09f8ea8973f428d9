// src/session/fetcher.rs

use super::Session;
use crate::{error::FetchError, utils};
use log::{debug, trace};
use reqwest::{Response, StatusCode};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static H1_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static LOGIN_TOKEN_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[name="logintoken"]"#).unwrap());
static LOGIN_FORM_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"form#login, form[action*="login/index.php"]"#).unwrap()
});
static PASSWORD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[type="password"]"#).unwrap());

const HIDDEN_TEXT_CLASSES: &[&str] = &["accesshide", "sr-only", "visually-hidden"];

/// 一个已获取并解析完成的页面
pub struct ParsedPage {
    /// 跟随重定向后的最终地址
    pub url: Url,
    pub html: Html,
    pub raw: String,
}

impl ParsedPage {
    pub fn parse(url: Url, raw: String) -> Self {
        let html = Html::parse_document(&raw);
        Self { url, html, raw }
    }

    pub fn select<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.html.select(selector)
    }

    pub fn select_first(&self, selector: &Selector) -> Option<ElementRef<'_>> {
        self.html.select(selector).next()
    }

    /// 优先取 `<h1>`，其次 `<title>`
    pub fn title(&self) -> Option<String> {
        [&*H1_SEL, &*TITLE_SEL]
            .into_iter()
            .filter_map(|sel| self.select_first(sel))
            .map(|el| utils::normalize_whitespace(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
    }

    /// 将页面内的相对链接解析为绝对地址
    pub fn resolve(&self, href: &str) -> Option<Url> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }
        self.url.join(href).ok()
    }

    /// 页面本身是否是登录表单
    pub fn is_login_page(&self) -> bool {
        is_login_document(&self.html)
    }
}

/// 取元素的可见文本，跳过屏幕阅读器专用的隐藏文字
pub fn visible_text(el: ElementRef<'_>) -> String {
    let root = el.id();
    let mut out = String::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != root)
            .chain(std::iter::once(*el))
            .filter_map(ElementRef::wrap)
            .any(|a| a.value().classes().any(|c| HIDDEN_TEXT_CLASSES.contains(&c)));
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    utils::normalize_whitespace(&out)
}

pub(crate) fn is_login_document(html: &Html) -> bool {
    if html.select(&LOGIN_TOKEN_SEL).next().is_some() {
        return true;
    }
    html.select(&LOGIN_FORM_SEL)
        .any(|form| form.select(&PASSWORD_SEL).next().is_some())
}

/// 通过会话执行 GET 并解析页面。只负责获取和解析，没有其他副作用。
pub struct PageFetcher;

impl PageFetcher {
    pub async fn get(session: &Session, url: &str) -> Result<ParsedPage, FetchError> {
        debug!("GET {}", url);
        let res = session
            .client()
            .get(url)
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Self::into_page(session, url, res).await
    }

    pub async fn post_form(
        session: &Session,
        url: &str,
        form: &[(String, String)],
    ) -> Result<ParsedPage, FetchError> {
        debug!("POST {} ({} 个字段)", url, form.len());
        let res = session
            .client()
            .post_form(url, form)
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Self::into_page(session, url, res).await
    }

    /// 只检查状态码和重定向，不读取响应体，供流式下载使用
    pub async fn get_response(session: &Session, url: &str) -> Result<Response, FetchError> {
        debug!("GET (stream) {}", url);
        let res = session
            .client()
            .get(url)
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Self::check_response(session, url, res)
    }

    pub fn check_response(
        session: &Session,
        requested: &str,
        res: Response,
    ) -> Result<Response, FetchError> {
        let status = res.status();
        trace!("{} -> {} ({})", requested, res.url(), status);
        if session.is_login_url(res.url()) || status == StatusCode::UNAUTHORIZED {
            return Err(FetchError::Unauthorized {
                url: requested.to_string(),
            });
        }
        if status.is_client_error() {
            return Err(FetchError::NotFound {
                url: requested.to_string(),
                status: status.as_u16(),
            });
        }
        if status.is_server_error() {
            return Err(FetchError::ServerError {
                url: requested.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(res)
    }

    async fn into_page(session: &Session, url: &str, res: Response) -> Result<ParsedPage, FetchError> {
        let res = Self::check_response(session, url, res)?;
        let final_url = res.url().clone();
        let body = res
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let page = ParsedPage::parse(final_url, body);
        if page.is_login_page() {
            return Err(FetchError::Unauthorized {
                url: url.to_string(),
            });
        }
        Ok(page)
    }
}
