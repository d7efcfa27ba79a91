// ==========================================
// ERP 导入连接器 - 远程接口错误类型
// ==========================================
// 工具: thiserror 派生宏
// 规则: 仅 Connectivity 可重试; Auth 永不重试
// ==========================================

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// 网络/HTTP 瞬时失败 (含超时)
    #[error("远程连接失败: {0}")]
    Connectivity(String),

    /// 凭据被拒绝
    #[error("远程认证失败: {0}")]
    Auth(String),

    /// 响应不符合协议 (非瞬时)
    #[error("远程协议错误: {0}")]
    Protocol(String),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Connectivity(_))
    }

    /// 按 HTTP 状态码归类
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body.trim())
        };
        match status {
            401 | 403 => RemoteError::Auth(detail),
            408 | 429 | 500..=599 => RemoteError::Connectivity(detail),
            _ => RemoteError::Protocol(detail),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Protocol(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::from_status(status.as_u16(), "")
        } else {
            // 超时/连接/请求发送失败均视为瞬时
            RemoteError::Connectivity(err.to_string())
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(matches!(RemoteError::from_status(401, ""), RemoteError::Auth(_)));
        assert!(matches!(RemoteError::from_status(403, "denied"), RemoteError::Auth(_)));
        assert!(RemoteError::from_status(503, "").is_retryable());
        assert!(RemoteError::from_status(429, "").is_retryable());
        assert!(matches!(
            RemoteError::from_status(404, "no such IDO"),
            RemoteError::Protocol(_)
        ));
    }

    #[test]
    fn test_only_connectivity_is_retryable() {
        assert!(RemoteError::Connectivity("reset".into()).is_retryable());
        assert!(!RemoteError::Auth("bad password".into()).is_retryable());
        assert!(!RemoteError::Protocol("bad json".into()).is_retryable());
    }
}
