// ==========================================
// ERP 导入连接器 - IDO HTTP 客户端
// ==========================================
// 接口:
// - GET {base}/ido/token/{config}      (Basic 认证) → {"Token": "..."}
// - GET {base}/ido/load/{object}?properties=&filter=&recordCap=&bookmark=
//       → {"Items": [...], "Bookmark": "...", "MoreRowsExist": bool, "Success": bool, "Message": ...}
// - GET {base}/ido/info/{object}       → {"Properties": [{"Name", "DataType", "Required"}]}
// 规则: 令牌缓存;数据请求返回 401 时清除缓存令牌
// ==========================================

use crate::remote::client::{
    CollectionQuery, ObjectSchema, RemoteClient, RemotePage, RemoteRow, SchemaField,
};
use crate::remote::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("erp-import-connector/", env!("CARGO_PKG_VERSION"));
const CONFIG_HEADER: &str = "X-Infor-MongooseConfig";

#[derive(Debug, Clone)]
pub struct IdoClientConfig {
    pub base_url: String,
    pub config_name: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

// ==========================================
// 响应结构
// ==========================================

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TokenResponse {
    token: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoadResponse {
    #[serde(default)]
    items: Vec<RemoteRow>,
    bookmark: Option<String>,
    #[serde(default)]
    more_rows_exist: bool,
    #[serde(default = "default_true")]
    success: bool,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InfoResponse {
    #[serde(default)]
    properties: Vec<InfoProperty>,
    #[serde(default = "default_true")]
    success: bool,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InfoProperty {
    name: String,
    data_type: String,
    #[serde(default)]
    required: bool,
}

fn failure_message(object: &str, message: Option<String>) -> RemoteError {
    RemoteError::Protocol(format!(
        "{} 请求失败: {}",
        object,
        message.unwrap_or_else(|| "未返回错误信息".to_string())
    ))
}

fn page_from_response(object: &str, resp: LoadResponse) -> RemoteResult<RemotePage> {
    if !resp.success {
        return Err(failure_message(object, resp.message));
    }
    let next_cursor = if resp.more_rows_exist {
        match resp.bookmark.filter(|b| !b.is_empty()) {
            Some(bookmark) => Some(bookmark),
            None => {
                return Err(RemoteError::Protocol(format!(
                    "{} 声明存在更多行但未返回 Bookmark",
                    object
                )))
            }
        }
    } else {
        None
    };
    Ok(RemotePage {
        rows: resp.items,
        next_cursor,
    })
}

fn schema_from_response(object: &str, resp: InfoResponse) -> RemoteResult<ObjectSchema> {
    if !resp.success {
        return Err(failure_message(object, resp.message));
    }
    let fields = resp
        .properties
        .into_iter()
        .map(|p| SchemaField {
            name: p.name,
            data_type: p.data_type,
            required: p.required,
        })
        .collect();
    Ok(ObjectSchema::new(object, fields))
}

/// load 请求的查询参数
fn load_params(query: &CollectionQuery, cursor: Option<&str>) -> Vec<(&'static str, String)> {
    let mut params = vec![("recordCap", query.page_size.to_string())];
    if !query.properties.is_empty() {
        params.push(("properties", query.properties.join(",")));
    }
    if let Some(filter) = query.filter.as_deref() {
        params.push(("filter", filter.to_string()));
    }
    if let Some(bookmark) = cursor {
        params.push(("bookmark", bookmark.to_string()));
    }
    params
}

// ==========================================
// IdoClient
// ==========================================
pub struct IdoClient {
    http: reqwest::Client,
    config: IdoClientConfig,
    token: Mutex<Option<String>>,
}

impl IdoClient {
    pub fn new(config: IdoClientConfig) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Connectivity(e.to_string()))?;

        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/ido/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn token(&self) -> RemoteResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let url = self.url(&format!("token/{}", self.config.config_name));
        debug!(url = %url, user = %self.config.username, "请求 IDO 令牌");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status.as_u16(), &body));
        }

        let body: TokenResponse = response.json().await?;
        let token = body.token.filter(|t| !t.is_empty()).ok_or_else(|| {
            RemoteError::Auth(body.message.unwrap_or_else(|| "未返回令牌".to_string()))
        })?;

        info!(config = %self.config.config_name, "IDO 令牌获取成功");
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> RemoteResult<T> {
        let token = self.token().await?;
        let url = self.url(path);

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, token)
            .header(CONFIG_HEADER, &self.config.config_name)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // 令牌可能已过期,下次调用重新获取
            *self.token.lock().await = None;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status.as_u16(), &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Protocol(format!("{} 响应解析失败: {}", path, e)))
    }
}

#[async_trait]
impl RemoteClient for IdoClient {
    async fn fetch_page(
        &self,
        query: &CollectionQuery,
        cursor: Option<&str>,
    ) -> RemoteResult<RemotePage> {
        let params = load_params(query, cursor);
        let resp: LoadResponse = self
            .get_json(&format!("load/{}", query.object), &params)
            .await?;
        page_from_response(&query.object, resp)
    }

    async fn describe_schema(&self, object: &str) -> RemoteResult<ObjectSchema> {
        let resp: InfoResponse = self.get_json(&format!("info/{}", object), &[]).await?;
        schema_from_response(object, resp)
    }
}
