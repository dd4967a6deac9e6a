use crate::config::schema::{HttpMethod, RunConfig};
use crate::error::{Error, Result};
use crate::executor::OperationExecutor;
use async_trait::async_trait;
use reqwest::{Client, Method, Proxy};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

const COUNTER_ATTEMPTS: u32 = 3;

pub struct HttpExecutor {
    client: Client,
    method: Method,
    counter_url: Option<String>,
    counter_pointer: String,
    has_proxy: bool,
    counter_attempts: u32,
    retry_backoff: Duration,
}

impl HttpExecutor {
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("loadpool/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(Proxy::all(proxy.as_str())?);
        }

        let method = match config.target.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Post => Method::POST,
        };

        Ok(Self {
            client: builder.build()?,
            method,
            counter_url: config.target.counter_url.clone(),
            counter_pointer: config.target.counter_pointer.clone(),
            has_proxy: config.proxy.is_some(),
            counter_attempts: COUNTER_ATTEMPTS,
            retry_backoff: Duration::from_secs(1),
        })
    }

    /// Overrides the counter-read retry policy. Attempt `n` waits `n * backoff`.
    pub fn with_counter_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.counter_attempts = attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    async fn fetch_counter(&self, url: &str) -> Result<u64> {
        let res = self.client.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }

        let body: Value = res.json().await?;
        extract_counter(&body, &self.counter_pointer)
    }
}

fn extract_counter(body: &Value, pointer: &str) -> Result<u64> {
    let value = body
        .pointer(pointer)
        .ok_or_else(|| Error::Counter(format!("no value at {}", pointer)))?;

    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| Error::Counter(format!("{} is not an unsigned integer", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::Counter(format!("{:?} is not an unsigned integer", s))),
        other => Err(Error::Counter(format!("unexpected value {}", other))),
    }
}

#[async_trait]
impl OperationExecutor for HttpExecutor {
    async fn perform_action(&self, target: &str) -> Result<()> {
        let res = self.client.request(self.method.clone(), target).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }
        Ok(())
    }

    async fn read_counter(&self, target_id: &str) -> Result<u64> {
        let template = self
            .counter_url
            .as_deref()
            .ok_or_else(|| Error::Counter("no counter endpoint configured".to_string()))?;
        let url = template.replace("{target}", target_id);

        let mut last_error = None;
        for attempt in 1..=self.counter_attempts {
            match self.fetch_counter(&url).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    log::debug!("Counter read attempt {}/{} failed: {}", attempt, self.counter_attempts, e);
                    last_error = Some(e);
                }
            }
            if attempt < self.counter_attempts {
                sleep(self.retry_backoff * attempt).await;
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Counter("no attempts made".to_string())))
    }

    fn proxies_available(&self) -> usize {
        usize::from(self.has_proxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counter_extraction_accepts_numbers_and_numeric_strings() {
        let body = json!({ "clip": { "view_count": 1234 }, "label": "987" });
        assert_eq!(extract_counter(&body, "/clip/view_count").unwrap(), 1234);
        assert_eq!(extract_counter(&body, "/label").unwrap(), 987);
    }

    #[test]
    fn counter_extraction_rejects_missing_or_negative() {
        let body = json!({ "count": -4 });
        assert!(matches!(extract_counter(&body, "/count"), Err(Error::Counter(_))));
        assert!(matches!(extract_counter(&body, "/missing"), Err(Error::Counter(_))));
    }
}
