// ==========================================
// 测试工厂数据
// ==========================================
// 设备: Line-1 / Line-2，默认物料 Widget，设计速度 100 units/h
// 原因: 覆盖可用性、性能、质量各类损失
// 日历: 连续生产（无班次）
// ==========================================

use chrono::{DateTime, TimeZone, Utc};
use oee_loss_engine::config::EngineSettings;
use oee_loss_engine::db::open_in_memory_connection;
use oee_loss_engine::domain::{
    Equipment, EquipmentMaterial, EventType, LossCategory, Material, Quantity, Reason,
    ResolvedEvent, ResolverConfiguration, TimeUnit, UnitOfMeasure, WorkSchedule,
};
use oee_loss_engine::engine::{InMemoryExecutionContext, LossWaterfallCalculator};
use oee_loss_engine::repository::{EventStore, MasterDataRepository, OeeEventRepository};
use oee_loss_engine::OeeApi;
use std::sync::Arc;

pub const LINE_1: &str = "Line-1";
pub const LINE_2: &str = "Line-2";

pub struct PlantFixture {
    pub master: Arc<MasterDataRepository>,
    pub events: Arc<OeeEventRepository>,
}

/// 2026-03-02 h:m UTC
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

pub fn units(amount: f64) -> Quantity {
    Quantity::new(amount, UnitOfMeasure::count("units"))
}

fn widget_association() -> EquipmentMaterial {
    EquipmentMaterial {
        material: "Widget".to_string(),
        design_speed: Quantity::new(100.0, UnitOfMeasure::rate("units", TimeUnit::Hour)),
        reject_uom: UnitOfMeasure::count("units"),
        run_rate_uom: UnitOfMeasure::count("units"),
        is_default: true,
    }
}

fn gadget_association() -> EquipmentMaterial {
    EquipmentMaterial {
        material: "Gadget".to_string(),
        design_speed: Quantity::new(60.0, UnitOfMeasure::rate("units", TimeUnit::Hour)),
        reject_uom: UnitOfMeasure::count("units"),
        run_rate_uom: UnitOfMeasure::count("units"),
        is_default: false,
    }
}

pub fn reason(name: &str) -> Reason {
    let category = match name {
        "Planned Maintenance" => LossCategory::PlannedDowntime,
        "Changeover" => LossCategory::Setup,
        "Jam" | "Motor Fault" => LossCategory::UnplannedDowntime,
        "Short Stop" => LossCategory::MinorStoppages,
        "Scratch" => LossCategory::RejectRework,
        "Warm-up" => LossCategory::StartupYield,
        "No Orders" => LossCategory::Unscheduled,
        _ => LossCategory::NoLoss,
    };
    Reason::new(name, category)
}

impl PlantFixture {
    pub fn new() -> Self {
        let conn = open_in_memory_connection().unwrap();
        let master = Arc::new(MasterDataRepository::from_connection(conn.clone()).unwrap());
        let events = Arc::new(OeeEventRepository::from_connection(conn).unwrap());

        for name in ["Widget", "Gadget"] {
            master.upsert_material(&Material::new(name)).unwrap();
        }
        for name in [
            "Planned Maintenance",
            "Changeover",
            "Jam",
            "Motor Fault",
            "Short Stop",
            "Scratch",
            "Warm-up",
            "No Orders",
            "Running",
        ] {
            master.upsert_reason(&reason(name)).unwrap();
        }

        for line in [LINE_1, LINE_2] {
            let mut equipment = Equipment::new(line);
            equipment.materials.push(widget_association());
            equipment.materials.push(gadget_association());
            master.upsert_equipment(&equipment).unwrap();
            master
                .upsert_work_schedule(line, &WorkSchedule::new("Continuous"))
                .unwrap();

            let prefix = line.to_lowercase().replace('-', "");
            let resolvers = [
                ("state", EventType::Availability, "value"),
                ("good", EventType::ProdGood, "value - resolver.last_value"),
                ("reject", EventType::ProdReject, "value"),
                ("startup", EventType::ProdStartup, "value"),
                ("matl", EventType::MatlChange, "value"),
                ("job", EventType::JobChange, "\"WO-\" + value"),
            ];
            for (suffix, event_type, script) in resolvers {
                let mut config = ResolverConfiguration::new(
                    &format!("{}.{}", prefix, suffix),
                    line,
                    event_type,
                    script,
                );
                config.update_period_ms = 1_000;
                master.upsert_resolver(&config).unwrap();
            }
        }

        Self { master, events }
    }

    pub fn api(&self, settings: EngineSettings) -> OeeApi {
        OeeApi::new(
            self.master.clone(),
            self.events.clone(),
            Arc::new(InMemoryExecutionContext::new()),
            settings,
        )
    }

    pub fn calculator(&self, settings: &EngineSettings) -> LossWaterfallCalculator {
        LossWaterfallCalculator::new(self.master.clone(), self.events.clone(), settings)
    }

    /// 插入开放的可用性事件（上一条由仓储自动关闭）
    pub fn state_change(&self, equipment: &str, start: DateTime<Utc>, reason_name: &str) {
        let mut event = ResolvedEvent::new(equipment, EventType::Availability, "fixture.state", start);
        event.reason = Some(reason(reason_name));
        self.events.insert_event(&event).unwrap();
    }

    pub fn production(
        &self,
        equipment: &str,
        event_type: EventType,
        start: DateTime<Utc>,
        amount: f64,
        reason_name: Option<&str>,
    ) {
        let mut event = ResolvedEvent::new(equipment, event_type, "fixture.count", start);
        event.quantity = Some(units(amount));
        event.material = Some(Material::new("Widget"));
        event.reason = reason_name.map(reason);
        self.events.insert_event(&event).unwrap();
    }

    /// 8 小时班：计划停机 30、换型 15、非计划停机 45（Jam 30 + Motor Fault 15）、小停机 10
    ///
    /// 窗口 06:00–14:00，最后一条运行状态不关闭
    pub fn eight_hour_shift(&self, equipment: &str) {
        self.state_change(equipment, at(6, 0), "Running");
        self.state_change(equipment, at(7, 0), "Planned Maintenance");
        self.state_change(equipment, at(7, 30), "Running");
        self.state_change(equipment, at(9, 0), "Changeover");
        self.state_change(equipment, at(9, 15), "Running");
        self.state_change(equipment, at(10, 0), "Jam");
        self.state_change(equipment, at(10, 30), "Motor Fault");
        self.state_change(equipment, at(10, 45), "Running");
        self.state_change(equipment, at(12, 0), "Short Stop");
        self.state_change(equipment, at(12, 10), "Running");
    }
}
