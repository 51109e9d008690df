// ==========================================
// OEE 损失引擎 - 核心库
// ==========================================
// 事件解析: 原始信号 → 脚本转换 → 带上下文的 OEE 事件
// 损失瀑布: 事件序列 → 十类损失时长 → 可用率/性能率/质量率/OEE → 帕累托
// 技术栈: Rust + SQLite + Rhai
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 解析与瀑布计算
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    Equipment, EquipmentMaterial, EventType, LossCategory, LossComponent, Material, Quantity,
    Reason, ResolvedEvent, ResolverConfiguration, TimeUnit, UnitOfMeasure, WorkSchedule,
};

// 引擎
pub use engine::{
    EngineError, EventResolver, ExecutionContext, InMemoryExecutionContext, LossAccumulator,
    LossWaterfallCalculator, ParetoItem, ResolverRegistry, ScriptInvoker,
};

// API
pub use api::{ApiError, OeeApi, OeeSummary};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "OEE 损失引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
