// ==========================================
// OEE 损失引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod event_repo;
pub mod master_data_repo;
pub mod oee_store;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use event_repo::OeeEventRepository;
pub use master_data_repo::MasterDataRepository;
pub use oee_store::{EventStore, MasterDataStore};
