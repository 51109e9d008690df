// ==========================================
// OEE 损失引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod equipment;
pub mod event;
pub mod quantity;
pub mod schedule;
pub mod types;

// 重导出核心类型
pub use equipment::{Equipment, EquipmentMaterial, Material, Reason};
pub use event::{ResolvedEvent, ResolverConfiguration};
pub use quantity::{Quantity, QuantityError, TimeUnit, UnitOfMeasure, MAX_DURATION_MS};
pub use schedule::{NonWorkingPeriod, Shift, ShiftInstance, WorkSchedule};
pub use types::{EventType, LossCategory, LossComponent};
