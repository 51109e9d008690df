// ==========================================
// OEE 损失引擎 - 解析器配置与解析事件
// ==========================================

use crate::domain::equipment::{Material, Reason};
use crate::domain::quantity::Quantity;
use crate::domain::types::EventType;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// ResolverConfiguration - 信号解析器配置
// ==========================================
// 由配置管理维护，解析期间只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfiguration {
    /// 数据源内唯一的信号标识
    pub source_id: String,
    /// 所属设备
    pub equipment: String,
    pub event_type: EventType,
    /// 转换脚本（函数体）
    pub script: String,
    /// 采集周期（毫秒）
    pub update_period_ms: u64,
    /// 数据源名称（OPC UA / Modbus / ...），仅用于展示
    pub data_source: Option<String>,
}

impl ResolverConfiguration {
    pub fn new(source_id: &str, equipment: &str, event_type: EventType, script: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            equipment: equipment.to_string(),
            event_type,
            script: script.to_string(),
            update_period_ms: 0,
            data_source: None,
        }
    }

    pub fn has_script(&self) -> bool {
        !self.script.trim().is_empty()
    }
}

// ==========================================
// ResolvedEvent - 解析后的 OEE 事件
// ==========================================
// 按事件类型只填充 reason / material / quantity 其中之一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEvent {
    pub event_id: String,
    pub equipment: String,
    pub event_type: EventType,
    pub source_id: String,
    pub start_time: DateTime<Utc>,
    /// 进行中的可用性状态没有结束时间
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub reason: Option<Reason>,
    pub material: Option<Material>,
    pub job: Option<String>,
    pub quantity: Option<Quantity>,
    /// 原始输入值（用于计数器增量基线）
    pub input_value: Option<serde_json::Value>,
    pub shift: Option<String>,
    pub team: Option<String>,
    /// 废品/开机损耗折算的损失时间（审计用）
    pub lost_time_ms: Option<i64>,
}

impl ResolvedEvent {
    pub fn new(
        equipment: &str,
        event_type: EventType,
        source_id: &str,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            equipment: equipment.to_string(),
            event_type,
            source_id: source_id.to_string(),
            start_time,
            end_time: None,
            duration_ms: None,
            reason: None,
            material: None,
            job: None,
            quantity: None,
            input_value: None,
            shift: None,
            team: None,
            lost_time_ms: None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::milliseconds)
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_ms = Some(duration.num_milliseconds());
    }

    pub fn lost_time(&self) -> Option<Duration> {
        self.lost_time_ms.map(Duration::milliseconds)
    }

    pub fn set_lost_time(&mut self, lost: Duration) {
        self.lost_time_ms = Some(lost.num_milliseconds());
    }

    /// 有效结束时间：显式结束时间优先，否则 开始 + 时长
    pub fn effective_end(&self) -> Option<DateTime<Utc>> {
        self.end_time
            .or_else(|| self.duration().map(|d| self.start_time + d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_effective_end_prefers_end_time() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let mut event = ResolvedEvent::new("Line-1", EventType::Availability, "S1", start);
        assert_eq!(event.effective_end(), None);

        event.set_duration(Duration::minutes(10));
        assert_eq!(event.effective_end(), Some(start + Duration::minutes(10)));

        event.end_time = Some(start + Duration::minutes(30));
        assert_eq!(event.effective_end(), Some(start + Duration::minutes(30)));
    }

    #[test]
    fn test_resolver_without_script() {
        let config = ResolverConfiguration::new("S1", "Line-1", EventType::Custom, "   ");
        assert!(!config.has_script());
    }
}
