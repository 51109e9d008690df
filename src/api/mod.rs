// ==========================================
// OEE 损失引擎 - API 层
// ==========================================
// 职责: 提供采集/报表入口，供采集循环、命令行、上层服务调用
// ==========================================

pub mod error;
pub mod oee_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use oee_api::{EquipmentStatus, LossBucket, OeeApi, OeeSummary, WaterfallTimes};
