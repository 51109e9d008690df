// ==========================================
// OEE 损失引擎 - 执行上下文
// ==========================================
// 职责: 按设备保存当前物料、当前工单、待挂接的质量原因
// 并发: 多个采集线程同时读写，使用 DashMap 分片锁
// 生命周期: 进程级，仅在显式 reset 时清空
// ==========================================

use crate::domain::{Material, Reason};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// 单台设备的上下文快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquipmentContext {
    pub material: Option<Material>,
    pub job: Option<String>,
    pub pending_quality_reason: Option<Reason>,
}

/// 执行上下文 Trait
///
/// 解析器只依赖此接口，可替换为分布式存储实现
pub trait ExecutionContext: Send + Sync {
    fn material(&self, equipment: &str) -> Option<Material>;

    fn set_material(&self, equipment: &str, material: Material);

    /// 当前无物料时写入 fallback，返回生效物料（原子操作）
    fn material_or_insert(&self, equipment: &str, fallback: Material) -> Material;

    fn job(&self, equipment: &str) -> Option<String>;

    fn set_job(&self, equipment: &str, job: String);

    fn set_quality_reason(&self, equipment: &str, reason: Reason);

    /// 取出并清除待挂接的质量原因
    fn take_quality_reason(&self, equipment: &str) -> Option<Reason>;

    fn snapshot(&self, equipment: &str) -> EquipmentContext;

    fn reset(&self);
}

// ==========================================
// InMemoryExecutionContext - 内存实现
// ==========================================
#[derive(Debug, Default)]
pub struct InMemoryExecutionContext {
    entries: DashMap<String, EquipmentContext>,
}

impl InMemoryExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionContext for InMemoryExecutionContext {
    fn material(&self, equipment: &str) -> Option<Material> {
        self.entries
            .get(equipment)
            .and_then(|entry| entry.material.clone())
    }

    fn set_material(&self, equipment: &str, material: Material) {
        self.entries
            .entry(equipment.to_string())
            .or_default()
            .material = Some(material);
    }

    fn material_or_insert(&self, equipment: &str, fallback: Material) -> Material {
        let mut entry = self.entries.entry(equipment.to_string()).or_default();
        entry.material.get_or_insert(fallback).clone()
    }

    fn job(&self, equipment: &str) -> Option<String> {
        self.entries.get(equipment).and_then(|entry| entry.job.clone())
    }

    fn set_job(&self, equipment: &str, job: String) {
        self.entries.entry(equipment.to_string()).or_default().job = Some(job);
    }

    fn set_quality_reason(&self, equipment: &str, reason: Reason) {
        self.entries
            .entry(equipment.to_string())
            .or_default()
            .pending_quality_reason = Some(reason);
    }

    fn take_quality_reason(&self, equipment: &str) -> Option<Reason> {
        self.entries
            .get_mut(equipment)
            .and_then(|mut entry| entry.pending_quality_reason.take())
    }

    fn snapshot(&self, equipment: &str) -> EquipmentContext {
        self.entries
            .get(equipment)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    fn reset(&self) {
        self.entries.clear();
    }
}
