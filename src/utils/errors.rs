// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::DbErr;
use thiserror::Error;

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("数据库错误: {0}")]
    Database(#[from] DbErr),

    #[error("未找到数据")]
    NotFound,

    #[error("数据已存在")]
    AlreadyExists,

    #[error("无效参数: {0}")]
    InvalidParameter(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 工作器错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Broker 错误: {0}")]
    BrokerError(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

/// 流水线统一错误类型
///
/// 所有任务处理器内部调用都收敛到这四类，
/// 由 Broker 根据类别决定重试、终止或取消。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// 网络、上游 5xx、限流、超时等暂时性错误
    #[error("暂时性错误: {0}")]
    Transient(String),

    /// 不可恢复的错误（配置缺失、404、载荷超限等）
    #[error("永久性错误: {0}")]
    Permanent(String),

    /// 任务被取消
    #[error("任务已取消")]
    Cancelled,

    /// 输出未通过校验
    #[error("校验失败: {0}")]
    Validation(String),
}

impl PipelineError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// 是否应交给 Broker 退避重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// 指标标签使用的类别名
    pub fn class(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::Permanent(_) => "permanent",
            Self::Cancelled => "cancelled",
            Self::Validation(_) => "validation",
        }
    }
}

impl From<RepositoryError> for PipelineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => PipelineError::Transient(e.to_string()),
            RepositoryError::NotFound => PipelineError::Permanent("记录不存在".to_string()),
            RepositoryError::AlreadyExists => {
                PipelineError::Permanent("记录已存在".to_string())
            }
            RepositoryError::InvalidParameter(msg) => PipelineError::Validation(msg),
            RepositoryError::Serialization(e) => PipelineError::Validation(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(PipelineError::transient("503").is_retryable());
        assert!(!PipelineError::permanent("404").is_retryable());
        assert!(!PipelineError::Cancelled.is_retryable());
        assert!(!PipelineError::validation("age").is_retryable());
    }

    #[test]
    fn test_repository_error_classification() {
        let err: PipelineError = RepositoryError::Database(DbErr::Custom("boom".into())).into();
        assert!(err.is_retryable());

        let err: PipelineError = RepositoryError::InvalidParameter("bad".into()).into();
        assert_eq!(err.class(), "validation");
    }
}
