// ==========================================
// OEE 损失引擎 - 事件解析器
// ==========================================
// 职责: (source_id, 原始值, 时间戳) → 解析事件
// 流程:
//   1. 产量类信号首次调用时播种增量基线
//   2. 执行转换脚本
//   3. 确定事件时间（脚本设置的时间戳优先）
//   4. 查找班次/班组
//   5. 按事件类型分支处理（物料/工单/原因/产量）
//   6. 回写增量基线
//   7. 组装解析事件
// 失败: 只影响当前事件，不修改上下文和缓存
// ==========================================

use crate::domain::{
    Equipment, EventType, Material, Quantity, Reason, ResolvedEvent, ResolverConfiguration,
    WorkSchedule,
};
use crate::engine::cache::NameCache;
use crate::engine::context::ExecutionContext;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::script::{ScriptContext, ScriptInvoker, ScriptOutcome};
use crate::repository::{EventStore, MasterDataStore};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub struct EventResolver {
    master_data: Arc<dyn MasterDataStore>,
    events: Arc<dyn EventStore>,
    context: Arc<dyn ExecutionContext>,
    invoker: ScriptInvoker,
    materials: NameCache<Material>,
    reasons: NameCache<Reason>,
    equipment: NameCache<Equipment>,
    schedules: NameCache<WorkSchedule>,
    // source_id -> 增量基线
    last_values: DashMap<String, Value>,
}

impl EventResolver {
    pub fn new(
        master_data: Arc<dyn MasterDataStore>,
        events: Arc<dyn EventStore>,
        context: Arc<dyn ExecutionContext>,
        invoker: ScriptInvoker,
    ) -> Self {
        Self {
            master_data,
            events,
            context,
            invoker,
            materials: NameCache::new(),
            reasons: NameCache::new(),
            equipment: NameCache::new(),
            schedules: NameCache::new(),
            last_values: DashMap::new(),
        }
    }

    pub fn context(&self) -> &Arc<dyn ExecutionContext> {
        &self.context
    }

    /// 当前增量基线
    pub fn last_value(&self, source_id: &str) -> Option<Value> {
        self.last_values.get(source_id).map(|v| v.clone())
    }

    /// 解析一条原始信号
    pub fn resolve(
        &self,
        config: &ResolverConfiguration,
        raw_value: &Value,
        timestamp: DateTime<Utc>,
    ) -> EngineResult<ResolvedEvent> {
        let equipment = config.equipment.as_str();
        let event_type = config.event_type;

        // 1. 增量基线
        let baseline = if event_type.is_production() {
            Some(self.seed_baseline(config, raw_value)?)
        } else {
            self.last_value(&config.source_id)
        };

        // 2. 脚本
        let script_context = ScriptContext {
            equipment: equipment.to_string(),
            material: self.context.material(equipment).map(|m| m.name),
            job: self.context.job(equipment),
        };
        let outcome =
            self.invoker
                .invoke(config, script_context, raw_value, baseline.as_ref())?;

        // 3. 事件时间
        let event_time = outcome.timestamp.unwrap_or(timestamp);

        let mut event = ResolvedEvent::new(equipment, event_type, &config.source_id, event_time);
        event.input_value = Some(raw_value.clone());

        // 4. 班次/班组（找不到不算错误）
        if let Some(schedule) = self.work_schedule(equipment)? {
            if let Some(shift) = schedule.find_shift(event_time.naive_utc()) {
                event.shift = Some(shift.shift);
                event.team = shift.team;
            }
        }

        // 5. 物料
        let material = if event_type == EventType::MatlChange {
            let name = output_as_name(&outcome.value).ok_or_else(|| {
                EngineError::Resolution(format!(
                    "物料名称缺失 (source_id={}, value={})",
                    config.source_id, outcome.value
                ))
            })?;
            let material = self.material_by_name(&name)?;
            self.context.set_material(equipment, material.clone());
            Some(material)
        } else {
            self.current_material(equipment)?
        };
        event.material = material.clone();

        // 5. 工单
        if event_type == EventType::JobChange {
            let job = output_as_name(&outcome.value).ok_or_else(|| {
                EngineError::Resolution(format!(
                    "工单号缺失 (source_id={})",
                    config.source_id
                ))
            })?;
            self.context.set_job(equipment, job.clone());
            event.job = Some(job);
        } else {
            event.job = self.context.job(equipment);
        }

        // 5. 类型分支
        match event_type {
            EventType::Availability => {
                let name = output_as_name(&outcome.value)
                    .or_else(|| outcome.reason.clone())
                    .ok_or_else(|| {
                        EngineError::Resolution(format!(
                            "原因名称缺失 (source_id={})",
                            config.source_id
                        ))
                    })?;
                let reason = self.reason_by_name(&name)?;
                if reason.loss_category.is_quality_loss() {
                    self.context.set_quality_reason(equipment, reason.clone());
                }
                event.reason = Some(reason);
            }
            EventType::ProdGood | EventType::ProdReject | EventType::ProdStartup => {
                let amount = output_as_number(&config.source_id, &outcome.value)?;
                let material = material.as_ref().ok_or_else(|| {
                    EngineError::Resolution(format!(
                        "设备 {} 无物料上下文，无法确定 {} 的产量单位",
                        equipment, event_type
                    ))
                })?;
                let uom = self
                    .equipment_by_name(equipment)?
                    .equipment_material(&material.name)
                    .and_then(|em| em.uom_for(event_type).cloned())
                    .ok_or_else(|| {
                        EngineError::Resolution(format!(
                            "设备 {} 未配置物料 {} 的产量单位",
                            equipment, material.name
                        ))
                    })?;
                event.quantity = Some(Quantity::new(amount, uom));

                event.reason = match outcome.reason.as_deref() {
                    Some(name) => Some(self.reason_by_name(name)?),
                    None => self.context.take_quality_reason(equipment),
                };
            }
            EventType::MatlChange | EventType::JobChange | EventType::Custom => {}
        }

        // 6. 回写基线
        self.store_baseline(config, raw_value, baseline, &outcome);

        debug!(
            equipment = %equipment,
            source_id = %config.source_id,
            event_type = %event_type,
            start = %event.start_time,
            "事件已解析"
        );

        // 7.
        Ok(event)
    }

    fn seed_baseline(&self, config: &ResolverConfiguration, raw_value: &Value) -> EngineResult<Value> {
        if let Some(existing) = self.last_values.get(&config.source_id) {
            return Ok(existing.clone());
        }

        let seed = self
            .events
            .fetch_last_event(&config.equipment, config.event_type)?
            .and_then(|event| event.input_value)
            .unwrap_or_else(|| raw_value.clone());

        Ok(self
            .last_values
            .entry(config.source_id.clone())
            .or_insert(seed)
            .clone())
    }

    /// 产量类：脚本改写了基线则采用脚本值，否则以本次原始值为新基线
    fn store_baseline(
        &self,
        config: &ResolverConfiguration,
        raw_value: &Value,
        before: Option<Value>,
        outcome: &ScriptOutcome,
    ) {
        let next = if config.event_type.is_production() {
            match &outcome.last_value {
                Some(v) if Some(v) != before.as_ref() => Some(v.clone()),
                _ => Some(raw_value.clone()),
            }
        } else {
            outcome.last_value.clone()
        };

        if let Some(value) = next {
            self.last_values.insert(config.source_id.clone(), value);
        }
    }

    /// 上下文物料；缺失时采用设备默认物料并写回上下文
    fn current_material(&self, equipment: &str) -> EngineResult<Option<Material>> {
        if let Some(material) = self.context.material(equipment) {
            return Ok(Some(material));
        }

        let default_name = match self.find_equipment(equipment)? {
            Some(eq) => match eq.default_equipment_material() {
                Some(em) => em.material.clone(),
                None => return Ok(None),
            },
            None => return Ok(None),
        };

        let fallback = self
            .materials
            .get_or_load(&default_name, |name| self.master_data.fetch_material_by_name(name))?
            .unwrap_or_else(|| Material::new(&default_name));
        Ok(Some(self.context.material_or_insert(equipment, fallback)))
    }

    fn material_by_name(&self, name: &str) -> EngineResult<Material> {
        self.materials
            .get_or_load(name, |n| self.master_data.fetch_material_by_name(n))?
            .ok_or_else(|| EngineError::Resolution(format!("物料不存在: {}", name)))
    }

    fn reason_by_name(&self, name: &str) -> EngineResult<Reason> {
        self.reasons
            .get_or_load(name, |n| self.master_data.fetch_reason_by_name(n))?
            .ok_or_else(|| EngineError::Resolution(format!("原因不存在: {}", name)))
    }

    fn find_equipment(&self, name: &str) -> EngineResult<Option<Equipment>> {
        Ok(self
            .equipment
            .get_or_load(name, |n| self.master_data.fetch_equipment_by_name(n))?)
    }

    pub fn equipment_by_name(&self, name: &str) -> EngineResult<Equipment> {
        self.find_equipment(name)?
            .ok_or_else(|| EngineError::Resolution(format!("设备不存在: {}", name)))
    }

    pub fn work_schedule(&self, equipment: &str) -> EngineResult<Option<WorkSchedule>> {
        Ok(self
            .schedules
            .get_or_load(equipment, |eq| self.master_data.find_work_schedule(eq))?)
    }

    /// 清空名称缓存与脚本编译缓存（增量基线保留）
    pub fn clear_caches(&self) {
        self.materials.clear();
        self.reasons.clear();
        self.equipment.clear();
        self.schedules.clear();
        self.invoker.clear_cache();
    }
}

/// 脚本输出 → 名称（字符串或数字）
fn output_as_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 脚本输出 → 数值（整数/浮点/数字字符串）
fn output_as_number(source_id: &str, value: &Value) -> EngineResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.filter(|v| v.is_finite()).ok_or_else(|| {
        EngineError::Conversion(format!(
            "产量值不是数值 (source_id={}, value={})",
            source_id, value
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::db::open_in_memory_connection;
    use crate::domain::{EquipmentMaterial, LossCategory, Shift, TimeUnit, UnitOfMeasure};
    use crate::engine::context::InMemoryExecutionContext;
    use crate::repository::{MasterDataRepository, OeeEventRepository};
    use chrono::{NaiveTime, TimeZone};
    use serde_json::json;

    struct Fixture {
        events: Arc<OeeEventRepository>,
        resolver: EventResolver,
    }

    fn widget(is_default: bool) -> EquipmentMaterial {
        EquipmentMaterial {
            material: "Widget".to_string(),
            design_speed: Quantity::new(100.0, UnitOfMeasure::rate("units", TimeUnit::Hour)),
            reject_uom: UnitOfMeasure::count("units"),
            run_rate_uom: UnitOfMeasure::count("units"),
            is_default,
        }
    }

    fn fixture_with(equipment: Equipment) -> Fixture {
        let conn = open_in_memory_connection().unwrap();
        let master = Arc::new(MasterDataRepository::from_connection(conn.clone()).unwrap());
        let events = Arc::new(OeeEventRepository::from_connection(conn).unwrap());

        master.upsert_material(&Material::new("Widget")).unwrap();
        master.upsert_material(&Material::new("Gadget")).unwrap();
        master
            .upsert_reason(&Reason::new("Jam", LossCategory::UnplannedDowntime))
            .unwrap();
        master
            .upsert_reason(&Reason::new("Scratch", LossCategory::RejectRework))
            .unwrap();
        master.upsert_equipment(&equipment).unwrap();

        let mut schedule = WorkSchedule::new("Two shifts");
        schedule.shifts.push(Shift {
            name: "Day".to_string(),
            start: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            duration_minutes: 480,
            team: Some("A".to_string()),
        });
        master.upsert_work_schedule("Line-1", &schedule).unwrap();

        let resolver = EventResolver::new(
            master,
            events.clone(),
            Arc::new(InMemoryExecutionContext::new()),
            ScriptInvoker::new(&EngineSettings::default()),
        );
        Fixture { events, resolver }
    }

    fn fixture() -> Fixture {
        let mut equipment = Equipment::new("Line-1");
        equipment.materials.push(widget(true));
        fixture_with(equipment)
    }

    fn cfg(source_id: &str, event_type: EventType, script: &str) -> ResolverConfiguration {
        ResolverConfiguration::new(source_id, "Line-1", event_type, script)
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn test_delta_from_persisted_baseline() {
        let f = fixture();
        let mut previous = ResolvedEvent::new("Line-1", EventType::ProdGood, "line1.good", at(7, 30));
        previous.input_value = Some(json!(100));
        f.events.insert_event(&previous).unwrap();

        let config = cfg("line1.good", EventType::ProdGood, "value - resolver.last_value");
        let event = f.resolver.resolve(&config, &json!(142), at(8, 0)).unwrap();
        assert_eq!(event.quantity.as_ref().unwrap().amount, 42.0);
        assert_eq!(f.resolver.last_value("line1.good"), Some(json!(142)));

        let next = f.resolver.resolve(&config, &json!(150), at(8, 5)).unwrap();
        assert_eq!(next.quantity.unwrap().amount, 8.0);
    }

    #[test]
    fn test_baseline_seeded_from_raw_value_without_history() {
        let f = fixture();
        let config = cfg("line1.good", EventType::ProdGood, "value - resolver.last_value");
        let event = f.resolver.resolve(&config, &json!(500), at(8, 0)).unwrap();
        assert_eq!(event.quantity.unwrap().amount, 0.0);
    }

    #[test]
    fn test_material_change_updates_context() {
        let f = fixture();
        let event = f
            .resolver
            .resolve(&cfg("line1.matl", EventType::MatlChange, "value"), &json!("Gadget"), at(8, 0))
            .unwrap();
        assert_eq!(event.material.unwrap().name, "Gadget");
        assert_eq!(
            f.resolver.context().material("Line-1").unwrap().name,
            "Gadget"
        );
    }

    #[test]
    fn test_unknown_material_fails_without_touching_context() {
        let f = fixture();
        let err = f
            .resolver
            .resolve(&cfg("line1.matl", EventType::MatlChange, "value"), &json!("Nope"), at(8, 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::Resolution(_)));
        assert!(f.resolver.context().material("Line-1").is_none());
    }

    #[test]
    fn test_production_adopts_default_material() {
        let f = fixture();
        let event = f
            .resolver
            .resolve(&cfg("line1.reject", EventType::ProdReject, "value"), &json!("12.5"), at(8, 0))
            .unwrap();
        assert_eq!(event.material.unwrap().name, "Widget");
        let quantity = event.quantity.unwrap();
        assert_eq!(quantity.amount, 12.5);
        assert_eq!(quantity.uom, UnitOfMeasure::count("units"));
        assert_eq!(
            f.resolver.context().material("Line-1").unwrap().name,
            "Widget"
        );
    }

    #[test]
    fn test_production_without_material_is_resolution_error() {
        let mut equipment = Equipment::new("Line-1");
        equipment.materials.push(widget(false));
        let f = fixture_with(equipment);
        let err = f
            .resolver
            .resolve(&cfg("line1.good", EventType::ProdGood, "value"), &json!(5), at(8, 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::Resolution(_)));
    }

    #[test]
    fn test_non_numeric_production_output_is_conversion_error() {
        let f = fixture();
        let err = f
            .resolver
            .resolve(&cfg("line1.good", EventType::ProdGood, "\"lots\""), &json!(5), at(8, 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::Conversion(_)));
    }

    #[test]
    fn test_job_change_and_propagation() {
        let f = fixture();
        let job = f
            .resolver
            .resolve(&cfg("line1.job", EventType::JobChange, "value"), &json!("WO-77"), at(8, 0))
            .unwrap();
        assert_eq!(job.job.as_deref(), Some("WO-77"));

        let good = f
            .resolver
            .resolve(&cfg("line1.good", EventType::ProdGood, "value"), &json!(3), at(8, 1))
            .unwrap();
        assert_eq!(good.job.as_deref(), Some("WO-77"));

        let err = f
            .resolver
            .resolve(&cfg("line1.job", EventType::JobChange, "()"), &json!("x"), at(8, 2))
            .unwrap_err();
        assert!(matches!(err, EngineError::Resolution(_)));
    }

    #[test]
    fn test_availability_reason_and_shift() {
        let f = fixture();
        let script = "if value == 0 { \"Jam\" } else { \"Running\" }";
        let event = f
            .resolver
            .resolve(&cfg("line1.state", EventType::Availability, script), &json!(0), at(9, 0))
            .unwrap();
        assert_eq!(event.reason.unwrap().name, "Jam");
        assert_eq!(event.shift.as_deref(), Some("Day"));
        assert_eq!(event.team.as_deref(), Some("A"));
        assert!(event.end_time.is_none());

        let err = f
            .resolver
            .resolve(&cfg("line1.state", EventType::Availability, script), &json!(1), at(9, 1))
            .unwrap_err();
        assert!(matches!(err, EngineError::Resolution(_)));
    }

    #[test]
    fn test_event_outside_shift_has_no_team() {
        let f = fixture();
        let event = f
            .resolver
            .resolve(&cfg("line1.state", EventType::Availability, "\"Jam\""), &json!(0), at(22, 0))
            .unwrap();
        assert!(event.shift.is_none());
        assert!(event.team.is_none());
    }

    #[test]
    fn test_script_timestamp_takes_precedence() {
        let f = fixture();
        let script = "resolver.timestamp = \"2026-03-02T10:30:00Z\"; \"Jam\"";
        let event = f
            .resolver
            .resolve(&cfg("line1.state", EventType::Availability, script), &json!(0), at(9, 0))
            .unwrap();
        assert_eq!(event.start_time, at(10, 30));
    }

    #[test]
    fn test_pending_quality_reason_attached_once() {
        let f = fixture();
        f.resolver
            .resolve(&cfg("line1.quality", EventType::Availability, "\"Scratch\""), &json!(1), at(8, 0))
            .unwrap();

        let reject = f
            .resolver
            .resolve(&cfg("line1.reject", EventType::ProdReject, "value"), &json!(2), at(8, 1))
            .unwrap();
        assert_eq!(reject.reason.unwrap().name, "Scratch");

        let second = f
            .resolver
            .resolve(&cfg("line1.reject", EventType::ProdReject, "value"), &json!(1), at(8, 2))
            .unwrap();
        assert!(second.reason.is_none());
    }

    #[test]
    fn test_empty_script_fails_event_only() {
        let f = fixture();
        let err = f
            .resolver
            .resolve(&cfg("line1.good", EventType::ProdGood, ""), &json!(1), at(8, 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::Script { .. }));
        assert!(f.resolver.context().material("Line-1").is_none());
    }
}
