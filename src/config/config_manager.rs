// ==========================================
// ERP 导入连接器 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::settings::{
    ConnectorSettings, ImportSettings, RemoteSettings, RoutingRuleSettings, StageSource,
    StageSources,
};
use crate::db::open_sqlite_connection;
use crate::importer::error::{ImportError, ImportResult};
use crate::remote::RetryPolicy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// 覆盖 remote.password 的环境变量
pub const PASSWORD_ENV: &str = "ERP_IMPORT_REMOTE_PASSWORD";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ImportResult<Self> {
        let conn = open_sqlite_connection(db_path).map_err(|e| ImportError::ConfigRead {
            key: "*".to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ImportResult<Option<String>> {
        let read_err = |message: String| ImportError::ConfigRead {
            key: key.to_string(),
            message,
        };
        let conn = self.conn.lock().map_err(|e| read_err(e.to_string()))?;

        conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| read_err(e.to_string()))
    }

    /// 写入 global scope 配置 (存在则覆盖)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ImportResult<()> {
        let conn = self.conn.lock().map_err(|e| ImportError::ConfigRead {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )
        .map_err(|e| ImportError::ConfigRead {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// 获取所有 global 配置的快照
    pub fn get_config_snapshot(&self) -> ImportResult<BTreeMap<String, String>> {
        let read_err = |message: String| ImportError::ConfigRead {
            key: "*".to_string(),
            message,
        };
        let conn = self.conn.lock().map_err(|e| read_err(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")
            .map_err(|e| read_err(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| read_err(e.to_string()))?;

        let mut snapshot = BTreeMap::new();
        for row in rows {
            let (key, value) = row.map_err(|e| read_err(e.to_string()))?;
            snapshot.insert(key, value);
        }
        Ok(snapshot)
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> ImportResult<String> {
        Ok(self
            .get_global_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    fn get_parsed<T>(&self, key: &str, default: T) -> ImportResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_global_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| ImportError::ConfigValue {
                key: key.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            }),
        }
    }

    fn get_positive<T>(&self, key: &str, default: T) -> ImportResult<T>
    where
        T: FromStr + PartialOrd + Default + Copy,
        T::Err: std::fmt::Display,
    {
        let value = self.get_parsed(key, default)?;
        if value <= T::default() {
            return Err(ImportError::ConfigValue {
                key: key.to_string(),
                value: self.get_config_or_default(key, "")?,
                message: "必须为正数".to_string(),
            });
        }
        Ok(value)
    }

    fn get_optional_filter(&self, key: &str, default: Option<&str>) -> ImportResult<Option<String>> {
        let value = match self.get_global_config_value(key)? {
            Some(raw) => Some(raw),
            None => default.map(str::to_string),
        };
        Ok(value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
    }

    /// 读取正则数组 (JSON),逐条编译校验
    fn get_patterns(&self, key: &str, default: Vec<String>) -> ImportResult<Vec<String>> {
        let raw = match self.get_global_config_value(key)? {
            Some(raw) => raw,
            None => return Ok(default),
        };
        let patterns: Vec<String> =
            serde_json::from_str(&raw).map_err(|e| ImportError::ConfigValue {
                key: key.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            })?;
        for pattern in &patterns {
            Regex::new(pattern).map_err(|e| ImportError::ConfigValue {
                key: key.to_string(),
                value: pattern.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(patterns)
    }

    /// 加载运行配置快照
    ///
    /// # 返回
    /// - Ok(ConnectorSettings): 缺省键使用默认值
    /// - Err(ConfigValue): 任一配置值格式错误
    pub fn load_settings(&self) -> ImportResult<ConnectorSettings> {
        let defaults = ConnectorSettings::default();

        let mut password = self.get_config_or_default(config_keys::REMOTE_PASSWORD, "")?;
        if let Ok(env_password) = std::env::var(PASSWORD_ENV) {
            debug!("使用环境变量覆盖远程密码");
            password = env_password;
        }

        let remote = RemoteSettings {
            base_url: self
                .get_config_or_default(config_keys::REMOTE_BASE_URL, "")?
                .trim()
                .trim_end_matches('/')
                .to_string(),
            config_name: self.get_config_or_default(config_keys::REMOTE_CONFIG_NAME, "")?,
            username: self.get_config_or_default(config_keys::REMOTE_USERNAME, "")?,
            password,
            page_size: self.get_positive(config_keys::REMOTE_PAGE_SIZE, defaults.remote.page_size)?,
            prefetch_pages: self.get_positive(
                config_keys::REMOTE_PREFETCH_PAGES,
                defaults.remote.prefetch_pages,
            )?,
            timeout: Duration::from_millis(self.get_positive(
                config_keys::REMOTE_TIMEOUT_MS,
                defaults.remote.timeout.as_millis() as u64,
            )?),
        };

        let retry = RetryPolicy {
            max_attempts: self.get_positive(
                config_keys::RETRY_MAX_ATTEMPTS,
                defaults.retry.max_attempts,
            )?,
            initial_backoff: Duration::from_millis(self.get_positive(
                config_keys::RETRY_INITIAL_BACKOFF_MS,
                defaults.retry.initial_backoff.as_millis() as u64,
            )?),
            max_backoff: Duration::from_millis(self.get_positive(
                config_keys::RETRY_MAX_BACKOFF_MS,
                defaults.retry.max_backoff.as_millis() as u64,
            )?),
            multiplier: defaults.retry.multiplier,
            call_timeout: remote.timeout,
        };

        let import = ImportSettings {
            worker_count: self.get_positive(
                config_keys::IMPORT_WORKER_COUNT,
                defaults.import.worker_count,
            )?,
            row_timeout: Duration::from_millis(self.get_positive(
                config_keys::IMPORT_ROW_TIMEOUT_MS,
                defaults.import.row_timeout.as_millis() as u64,
            )?),
        };

        let sources = StageSources {
            master_data: StageSource {
                object: self.get_config_or_default(
                    config_keys::OBJECT_MASTER_DATA,
                    &defaults.sources.master_data.object,
                )?,
                filter: self.get_optional_filter(config_keys::FILTER_MASTER_DATA, None)?,
            },
            routing: StageSource {
                object: self.get_config_or_default(
                    config_keys::OBJECT_ROUTING,
                    &defaults.sources.routing.object,
                )?,
                filter: self.get_optional_filter(
                    config_keys::FILTER_ROUTING,
                    defaults.sources.routing.filter.as_deref(),
                )?,
            },
            production: StageSource {
                object: self.get_config_or_default(
                    config_keys::OBJECT_PRODUCTION,
                    &defaults.sources.production.object,
                )?,
                filter: self.get_optional_filter(
                    config_keys::FILTER_PRODUCTION,
                    defaults.sources.production.filter.as_deref(),
                )?,
            },
        };

        let routing = RoutingRuleSettings {
            skip_patterns: self.get_patterns(
                config_keys::ROUTING_SKIP_PATTERNS,
                defaults.routing.skip_patterns.clone(),
            )?,
            cooperation_patterns: self.get_patterns(
                config_keys::ROUTING_COOPERATION_PATTERNS,
                defaults.routing.cooperation_patterns.clone(),
            )?,
        };

        let require_operation = self.get_parsed(
            config_keys::PRODUCTION_REQUIRE_OPERATION,
            defaults.require_operation,
        )?;

        info!(
            base_url = %remote.base_url,
            page_size = remote.page_size,
            worker_count = import.worker_count,
            "连接器配置已加载"
        );

        Ok(ConnectorSettings {
            remote,
            retry,
            import,
            sources,
            routing,
            require_operation,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 远程接口
    pub const REMOTE_BASE_URL: &str = "remote.base_url";
    pub const REMOTE_CONFIG_NAME: &str = "remote.config_name";
    pub const REMOTE_USERNAME: &str = "remote.username";
    pub const REMOTE_PASSWORD: &str = "remote.password";
    pub const REMOTE_PAGE_SIZE: &str = "remote.page_size";
    pub const REMOTE_PREFETCH_PAGES: &str = "remote.prefetch_pages";
    pub const REMOTE_TIMEOUT_MS: &str = "remote.timeout_ms";

    // 重试
    pub const RETRY_MAX_ATTEMPTS: &str = "remote.retry.max_attempts";
    pub const RETRY_INITIAL_BACKOFF_MS: &str = "remote.retry.initial_backoff_ms";
    pub const RETRY_MAX_BACKOFF_MS: &str = "remote.retry.max_backoff_ms";

    // 行处理
    pub const IMPORT_WORKER_COUNT: &str = "import.worker_count";
    pub const IMPORT_ROW_TIMEOUT_MS: &str = "import.row_timeout_ms";

    // 远程对象与过滤
    pub const OBJECT_MASTER_DATA: &str = "remote.object.master_data";
    pub const OBJECT_ROUTING: &str = "remote.object.routing";
    pub const OBJECT_PRODUCTION: &str = "remote.object.production";
    pub const FILTER_MASTER_DATA: &str = "remote.filter.master_data";
    pub const FILTER_ROUTING: &str = "remote.filter.routing";
    pub const FILTER_PRODUCTION: &str = "remote.filter.production";

    // 业务规则
    pub const ROUTING_SKIP_PATTERNS: &str = "routing.skip_patterns"; // JSON 数组
    pub const ROUTING_COOPERATION_PATTERNS: &str = "routing.cooperation_patterns"; // JSON 数组
    pub const PRODUCTION_REQUIRE_OPERATION: &str = "production.require_operation";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConfigManager {
        let conn = crate::db::open_in_memory().unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_defaults_when_table_empty() {
        let settings = manager().load_settings().unwrap();
        let defaults = ConnectorSettings::default();
        assert_eq!(settings.import, defaults.import);
        assert_eq!(settings.sources, defaults.sources);
        assert_eq!(settings.routing, defaults.routing);
        assert!(settings.require_operation);
        assert_eq!(settings.retry.max_attempts, 4);
    }

    #[test]
    fn test_overrides() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::IMPORT_WORKER_COUNT, "8")
            .unwrap();
        mgr.set_global_config_value(config_keys::REMOTE_BASE_URL, "https://erp.local/api/")
            .unwrap();
        mgr.set_global_config_value(config_keys::FILTER_ROUTING, "")
            .unwrap();
        mgr.set_global_config_value(config_keys::ROUTING_COOPERATION_PATTERNS, r#"["^KOO","^EXT"]"#)
            .unwrap();
        mgr.set_global_config_value(config_keys::PRODUCTION_REQUIRE_OPERATION, "false")
            .unwrap();

        let settings = mgr.load_settings().unwrap();
        assert_eq!(settings.import.worker_count, 8);
        assert_eq!(settings.remote.base_url, "https://erp.local/api");
        assert_eq!(settings.sources.routing.filter, None);
        assert_eq!(settings.routing.cooperation_patterns, vec!["^KOO", "^EXT"]);
        assert!(!settings.require_operation);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::IMPORT_WORKER_COUNT, "0")
            .unwrap();
        assert!(matches!(
            mgr.load_settings(),
            Err(ImportError::ConfigValue { .. })
        ));

        mgr.set_global_config_value(config_keys::IMPORT_WORKER_COUNT, "2")
            .unwrap();
        mgr.set_global_config_value(config_keys::ROUTING_SKIP_PATTERNS, r#"["(unclosed"]"#)
            .unwrap();
        let err = mgr.load_settings().unwrap_err();
        assert!(matches!(err, ImportError::ConfigValue { ref key, .. } if key == config_keys::ROUTING_SKIP_PATTERNS));
    }

    #[test]
    fn test_snapshot_lists_global_keys() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::REMOTE_USERNAME, "svc")
            .unwrap();
        let snapshot = mgr.get_config_snapshot().unwrap();
        assert_eq!(snapshot.get(config_keys::REMOTE_USERNAME).map(String::as_str), Some("svc"));
    }
}
