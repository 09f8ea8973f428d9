// src/session/mod.rs

mod authenticator;
mod fetcher;

pub use authenticator::SessionAuthenticator;
pub use fetcher::{PageFetcher, ParsedPage, visible_text};

use crate::{
    client::RobustClient,
    constants::moodle,
    error::{AppResult, AuthError, FetchError},
};
use log::{info, warn};
use reqwest::Response;
use std::future::Future;
use url::Url;

/// 已认证的 HTTP 上下文 (Cookie 罐 + 基础请求头)。
/// 克隆代价很低，克隆体共享同一个 Cookie 罐。
#[derive(Clone)]
pub struct Session {
    client: RobustClient,
    login_url: Url,
}

impl Session {
    pub(crate) fn new(client: RobustClient, login_url: Url) -> Self {
        Self { client, login_url }
    }

    pub fn client(&self) -> &RobustClient {
        &self.client
    }

    /// 判断一个 (重定向后的) 地址是否是登录页
    pub fn is_login_url(&self, url: &Url) -> bool {
        let path = url.path();
        url.host_str() == self.login_url.host_str()
            && (path == self.login_url.path() || path.ends_with(moodle::LOGIN_PATH))
    }
}

/// 整个流水线共享的唯一会话句柄。
///
/// 所有组件通过 `&mut SessionHandle` 发起请求。一旦某个请求被重定向回登录页，
/// 句柄会重新登录一次、原地替换会话，并把触发的请求重试一次；
/// 重试仍然过期则按认证错误处理。
pub struct SessionHandle {
    session: Session,
    authenticator: SessionAuthenticator,
    reauth_count: usize,
}

impl SessionHandle {
    pub async fn login(authenticator: SessionAuthenticator) -> Result<Self, AuthError> {
        let session = authenticator.authenticate().await?;
        Ok(Self {
            session,
            authenticator,
            reauth_count: 0,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// 本次运行中因会话过期而重新登录的次数
    pub fn reauth_count(&self) -> usize {
        self.reauth_count
    }

    pub async fn get_page(&mut self, url: &str) -> AppResult<ParsedPage> {
        self.with_recovery(|session| async move { PageFetcher::get(&session, url).await })
            .await
    }

    pub async fn post_form(&mut self, url: &str, form: &[(String, String)]) -> AppResult<ParsedPage> {
        self.with_recovery(|session| async move { PageFetcher::post_form(&session, url, form).await })
            .await
    }

    pub async fn get_response(&mut self, url: &str) -> AppResult<Response> {
        self.with_recovery(|session| async move { PageFetcher::get_response(&session, url).await })
            .await
    }

    async fn with_recovery<T, F, Fut>(&mut self, mut op: F) -> AppResult<T>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        match op(self.session.clone()).await {
            Err(FetchError::Unauthorized { url }) => {
                warn!("会话已过期 ({})，重新登录后重试一次", url);
                self.reauthenticate().await?;
                match op(self.session.clone()).await {
                    Err(FetchError::Unauthorized { url }) => {
                        Err(AuthError::SessionExpired { url }.into())
                    }
                    other => other.map_err(Into::into),
                }
            }
            other => other.map_err(Into::into),
        }
    }

    async fn reauthenticate(&mut self) -> Result<(), AuthError> {
        let fresh = self.authenticator.authenticate().await?;
        self.session = fresh;
        self.reauth_count += 1;
        info!("重新登录成功 (第 {} 次)", self.reauth_count);
        Ok(())
    }
}
