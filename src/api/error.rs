// ==========================================
// OEE 损失引擎 - API层错误类型
// ==========================================
// 职责: 将引擎/仓储层的技术错误转换为调用方可读的错误消息
// 约定: 事件级错误（脚本/解析/转换）由采集循环决定记录后继续；
//       配置错误使整个区间计算失败
// ==========================================

use crate::engine::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 事件级错误
    // ==========================================
    #[error("脚本错误: {0}")]
    ScriptError(String),

    #[error("解析失败: {0}")]
    ResolutionError(String),

    #[error("数值转换失败: {0}")]
    ConversionError(String),

    // ==========================================
    // 区间级错误
    // ==========================================
    #[error("配置缺失: {0}")]
    ConfigurationError(String),

    // ==========================================
    // 输入错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 是否只影响单条事件（采集循环可记录后继续）
    pub fn is_event_scoped(&self) -> bool {
        matches!(
            self,
            ApiError::ScriptError(_) | ApiError::ResolutionError(_) | ApiError::ConversionError(_)
        )
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::SerializationError(msg) => {
                ApiError::InternalError(format!("数据格式错误: {}", msg))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Script { source_id, message } => {
                ApiError::ScriptError(format!("source_id={}: {}", source_id, message))
            }
            EngineError::Resolution(msg) => ApiError::ResolutionError(msg),
            EngineError::Conversion(msg) => ApiError::ConversionError(msg),
            EngineError::Configuration(msg) => ApiError::ConfigurationError(msg),
            EngineError::Quantity(err) => {
                ApiError::ConfigurationError(format!("计量单位配置不一致: {}", err))
            }
            EngineError::Repository(err) => ApiError::from(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuantityError;

    #[test]
    fn test_engine_errors_keep_scope() {
        let script: ApiError = EngineError::script("line1.good", "boom").into();
        assert!(script.is_event_scoped());
        assert!(script.to_string().contains("line1.good"));

        let config: ApiError = EngineError::Configuration("无工作日历".to_string()).into();
        assert!(!config.is_event_scoped());

        let quantity: ApiError = EngineError::from(QuantityError::NotARate("units".to_string())).into();
        assert!(matches!(quantity, ApiError::ConfigurationError(_)));
    }

    #[test]
    fn test_repository_errors_are_mapped() {
        let err: ApiError = RepositoryError::LockError("poisoned".to_string()).into();
        assert!(matches!(err, ApiError::DatabaseConnectionError(_)));

        let wrapped: ApiError =
            EngineError::Repository(RepositoryError::DatabaseQueryError("x".to_string())).into();
        assert!(matches!(wrapped, ApiError::DatabaseError(_)));
    }
}
