// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时文件数据库、最小主数据
// ==========================================

#![allow(dead_code)]

use oee_loss_engine::config::ConfigManager;
use oee_loss_engine::domain::{
    Equipment, EquipmentMaterial, EventType, LossCategory, Material, Quantity, Reason,
    ResolverConfiguration, TimeUnit, UnitOfMeasure, WorkSchedule,
};
use oee_loss_engine::repository::{MasterDataRepository, OeeEventRepository};
use std::error::Error;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是 UTF-8")?
        .to_string();

    MasterDataRepository::new(&db_path)?;
    OeeEventRepository::new(&db_path)?;
    ConfigManager::new(&db_path)?;

    Ok((temp_file, db_path))
}

/// 写入一条产线: Press-7，物料 Bracket（设计速度 120 units/h），状态/计数两个数据源
pub fn seed_press_line(db_path: &str) -> Result<(), Box<dyn Error>> {
    let master = MasterDataRepository::new(db_path)?;

    master.upsert_material(&Material::new("Bracket"))?;
    master.upsert_reason(&Reason::new("Running", LossCategory::NoLoss))?;
    master.upsert_reason(&Reason::new("Die Change", LossCategory::Setup))?;
    master.upsert_reason(&Reason::new("Hydraulic Leak", LossCategory::UnplannedDowntime))?;

    let mut press = Equipment::new("Press-7");
    press.materials.push(EquipmentMaterial {
        material: "Bracket".to_string(),
        design_speed: Quantity::new(120.0, UnitOfMeasure::rate("units", TimeUnit::Hour)),
        reject_uom: UnitOfMeasure::count("units"),
        run_rate_uom: UnitOfMeasure::count("units"),
        is_default: true,
    });
    master.upsert_equipment(&press)?;
    master.upsert_work_schedule("Press-7", &WorkSchedule::new("Continuous"))?;

    master.upsert_resolver(&ResolverConfiguration::new(
        "press7.state",
        "Press-7",
        EventType::Availability,
        "value",
    ))?;
    master.upsert_resolver(&ResolverConfiguration::new(
        "press7.count",
        "Press-7",
        EventType::ProdGood,
        "value - resolver.last_value",
    ))?;
    Ok(())
}
