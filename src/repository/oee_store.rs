// ==========================================
// OEE 损失引擎 - 外部协作方接口
// ==========================================
// 职责: 定义引擎所需的数据读取/写入接口（不包含实现）
// 实现者: MasterDataRepository / OeeEventRepository（rusqlite）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::{
    Equipment, EventType, Material, Reason, ResolvedEvent, ResolverConfiguration, WorkSchedule,
};
use crate::repository::error::RepositoryResult;
use chrono::{DateTime, Utc};

// ==========================================
// MasterDataStore Trait
// ==========================================
// 用途: 解析器配置、原因、物料、设备、工作日历
pub trait MasterDataStore: Send + Sync {
    /// 读取全部信号解析器配置
    fn fetch_event_resolvers(&self) -> RepositoryResult<Vec<ResolverConfiguration>>;

    /// 按名称读取原因，不存在返回 None
    fn fetch_reason_by_name(&self, name: &str) -> RepositoryResult<Option<Reason>>;

    /// 按名称读取物料，不存在返回 None
    fn fetch_material_by_name(&self, name: &str) -> RepositoryResult<Option<Material>>;

    /// 按名称读取设备（含设备-物料关联）
    fn fetch_equipment_by_name(&self, name: &str) -> RepositoryResult<Option<Equipment>>;

    /// 查找设备的工作日历
    fn find_work_schedule(&self, equipment: &str) -> RepositoryResult<Option<WorkSchedule>>;
}

// ==========================================
// EventStore Trait
// ==========================================
// 用途: 解析事件的持久化与区间查询
pub trait EventStore: Send + Sync {
    /// 保存解析事件
    fn insert_event(&self, event: &ResolvedEvent) -> RepositoryResult<()>;

    /// 读取设备某类型的最后一条事件
    fn fetch_last_event(
        &self,
        equipment: &str,
        event_type: EventType,
    ) -> RepositoryResult<Option<ResolvedEvent>>;

    /// 读取 [from, to] 区间的产量事件（合格/废品/开机损耗），按时间升序
    fn fetch_production_events(
        &self,
        equipment: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<ResolvedEvent>>;

    /// 读取与 [from, to] 有交集的可用性事件，按时间升序
    fn fetch_availability_events(
        &self,
        equipment: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<ResolvedEvent>>;
}
