// ==========================================
// OEE 损失引擎 - 引擎层错误类型
// ==========================================
// 事件级错误（脚本/解析/转换）只影响单条事件
// 配置错误使整个设备区间的瀑布计算失败
// ==========================================

use crate::domain::QuantityError;
use crate::repository::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// 脚本为空、执行抛错、或返回值形态不符
    #[error("脚本错误 (source_id={source_id}): {message}")]
    Script { source_id: String, message: String },

    /// 原因/物料名称无法解析，或事件类型要求的值缺失
    #[error("解析错误: {0}")]
    Resolution(String),

    /// 产量输出无法转为数值
    #[error("数值转换错误: {0}")]
    Conversion(String),

    /// 缺少工作日历或设计速度
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error(transparent)]
    Quantity(#[from] QuantityError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    pub fn script(source_id: &str, message: impl Into<String>) -> Self {
        EngineError::Script {
            source_id: source_id.to_string(),
            message: message.into(),
        }
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
