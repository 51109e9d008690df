// ==========================================
// OEE 损失引擎 - 设备/物料/原因 主数据
// ==========================================
// 说明: 工厂层级模型由外部维护，这里只保留引擎读取的字段
// ==========================================

use crate::domain::quantity::{Quantity, UnitOfMeasure};
use crate::domain::types::{EventType, LossCategory};
use serde::{Deserialize, Serialize};

/// 物料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            category: None,
        }
    }
}

/// 停机/损失原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub name: String,
    pub description: Option<String>,
    pub loss_category: LossCategory,
}

impl Reason {
    pub fn new(name: &str, loss_category: LossCategory) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            loss_category,
        }
    }
}

/// 设备-物料 关联（设计速度与产量单位）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentMaterial {
    pub material: String,
    /// 设计速度（理想节拍），速率单位
    pub design_speed: Quantity,
    /// 废品计量单位
    pub reject_uom: UnitOfMeasure,
    /// 合格品/开机损耗计量单位
    pub run_rate_uom: UnitOfMeasure,
    /// 是否为设备默认物料
    pub is_default: bool,
}

impl EquipmentMaterial {
    /// 按事件类型选择产量单位
    pub fn uom_for(&self, event_type: EventType) -> Option<&UnitOfMeasure> {
        match event_type {
            EventType::ProdGood | EventType::ProdStartup => Some(&self.run_rate_uom),
            EventType::ProdReject => Some(&self.reject_uom),
            _ => None,
        }
    }
}

/// 设备
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub name: String,
    pub description: Option<String>,
    pub materials: Vec<EquipmentMaterial>,
}

impl Equipment {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            materials: Vec::new(),
        }
    }

    pub fn equipment_material(&self, material: &str) -> Option<&EquipmentMaterial> {
        self.materials.iter().find(|m| m.material == material)
    }

    pub fn default_equipment_material(&self) -> Option<&EquipmentMaterial> {
        self.materials.iter().find(|m| m.is_default)
    }
}
