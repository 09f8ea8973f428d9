// src/client.rs

use crate::{config::AppConfig, error::*};
use reqwest::{IntoUrl, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::sync::Arc;

/// 带 Cookie 存储和瞬时错误重试的 HTTP 客户端。
/// 每个实例拥有独立的 Cookie 罐，重新登录时整体替换。
///
/// 只有 GET 经过重试中间件。表单 POST (登录、开始作答、提交作答) 不是幂等的，
/// 直接走共享同一 Cookie 罐的底层客户端，失败只发送一次。
#[derive(Clone)]
pub struct RobustClient {
    pub client: ClientWithMiddleware,
    plain: reqwest::Client,
}

impl RobustClient {
    pub fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(config.retry_min_delay, config.retry_max_delay)
            .build_with_max_retries(config.max_retries);
        let plain = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .cookie_store(true)
            .build()?;
        let client = ClientBuilder::new(plain.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client, plain })
    }

    pub async fn get<T: IntoUrl>(&self, url: T) -> Result<Response, reqwest_middleware::Error> {
        self.client.get(url).send().await
    }

    pub async fn post_form<T: IntoUrl>(
        &self,
        url: T,
        form: &[(String, String)],
    ) -> Result<Response, reqwest_middleware::Error> {
        self.plain
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(reqwest_middleware::Error::from)
    }
}
