// ==========================================
// OEE 损失引擎 - 领域类型定义
// ==========================================
// 职责: 事件类型、损失类别、报表分量
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 事件类型 (Event Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Availability, // 设备可用性状态（停机原因）
    ProdGood,     // 合格品产量
    ProdReject,   // 废品/返工产量
    ProdStartup,  // 开机损耗产量
    MatlChange,   // 物料切换
    JobChange,    // 工单切换
    Custom,       // 自定义，无后处理
}

impl EventType {
    /// 是否为产量类事件（计数器型数据源）
    pub fn is_production(&self) -> bool {
        matches!(
            self,
            EventType::ProdGood | EventType::ProdReject | EventType::ProdStartup
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Availability => "AVAILABILITY",
            EventType::ProdGood => "PROD_GOOD",
            EventType::ProdReject => "PROD_REJECT",
            EventType::ProdStartup => "PROD_STARTUP",
            EventType::MatlChange => "MATL_CHANGE",
            EventType::JobChange => "JOB_CHANGE",
            EventType::Custom => "CUSTOM",
        }
    }

    /// 从字符串解析事件类型（大小写不敏感）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "AVAILABILITY" => Some(EventType::Availability),
            "PROD_GOOD" => Some(EventType::ProdGood),
            "PROD_REJECT" => Some(EventType::ProdReject),
            "PROD_STARTUP" => Some(EventType::ProdStartup),
            "MATL_CHANGE" => Some(EventType::MatlChange),
            "JOB_CHANGE" => Some(EventType::JobChange),
            "CUSTOM" => Some(EventType::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 损失类别 (Loss Category)
// ==========================================
// 十类互斥时间分类，覆盖设备全部经过时间
// 声明顺序即瀑布扣减顺序，NO_LOSS 位于最后
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LossCategory {
    NotScheduled,      // 非计划时间
    Unscheduled,       // 计划外（无生产需求）
    PlannedDowntime,   // 计划停机
    Setup,             // 换型调整
    UnplannedDowntime, // 非计划停机
    MinorStoppages,    // 小停机
    ReducedSpeed,      // 降速损失（反推得到）
    RejectRework,      // 废品返工
    StartupYield,      // 开机损耗
    NoLoss,            // 无损失（增值时间）
}

/// 报表分量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LossComponent {
    Availability,
    Performance,
    Quality,
    NonWorking,
    Normal,
}

impl LossCategory {
    /// 全部十个类别（瀑布顺序）
    pub const ALL: [LossCategory; 10] = [
        LossCategory::NotScheduled,
        LossCategory::Unscheduled,
        LossCategory::PlannedDowntime,
        LossCategory::Setup,
        LossCategory::UnplannedDowntime,
        LossCategory::MinorStoppages,
        LossCategory::ReducedSpeed,
        LossCategory::RejectRework,
        LossCategory::StartupYield,
        LossCategory::NoLoss,
    ];

    pub fn component(&self) -> LossComponent {
        match self {
            LossCategory::PlannedDowntime | LossCategory::Setup | LossCategory::UnplannedDowntime => {
                LossComponent::Availability
            }
            LossCategory::MinorStoppages | LossCategory::ReducedSpeed => LossComponent::Performance,
            LossCategory::RejectRework | LossCategory::StartupYield => LossComponent::Quality,
            LossCategory::NotScheduled | LossCategory::Unscheduled => LossComponent::NonWorking,
            LossCategory::NoLoss => LossComponent::Normal,
        }
    }

    /// 是否计入帕累托分析的"真实损失"
    pub fn is_true_loss(&self) -> bool {
        !matches!(
            self,
            LossCategory::NoLoss | LossCategory::NotScheduled | LossCategory::Unscheduled
        )
    }

    /// 是否为质量类损失（废品/开机损耗）
    pub fn is_quality_loss(&self) -> bool {
        self.component() == LossComponent::Quality
    }

    /// 由日历或产量推导、不由可用性状态计时的类别
    pub fn is_derived(&self) -> bool {
        self.is_quality_loss()
            || matches!(self, LossCategory::ReducedSpeed | LossCategory::NotScheduled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LossCategory::NotScheduled => "NOT_SCHEDULED",
            LossCategory::Unscheduled => "UNSCHEDULED",
            LossCategory::PlannedDowntime => "PLANNED_DOWNTIME",
            LossCategory::Setup => "SETUP",
            LossCategory::UnplannedDowntime => "UNPLANNED_DOWNTIME",
            LossCategory::MinorStoppages => "MINOR_STOPPAGES",
            LossCategory::ReducedSpeed => "REDUCED_SPEED",
            LossCategory::RejectRework => "REJECT_REWORK",
            LossCategory::StartupYield => "STARTUP_YIELD",
            LossCategory::NoLoss => "NO_LOSS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_uppercase();
        LossCategory::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == upper)
    }
}

impl fmt::Display for LossCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
