// ==========================================
// 配置集成测试
// ==========================================
// 测试范围: config_kv 持久化、EngineSettings 加载、OeeApi::open
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

mod helpers;

use helpers::mock_config::MockConfig;
use helpers::plant_fixture::at;
use oee_loss_engine::config::{config_keys, ConfigManager, EngineConfigReader, EngineSettings};
use oee_loss_engine::domain::{LossCategory, TimeUnit};
use oee_loss_engine::OeeApi;
use serde_json::json;
use test_helpers::{create_test_db, seed_press_line};

#[test]
fn test_config_persists_across_managers() {
    let (_temp_file, db_path) = create_test_db().unwrap();

    {
        let manager = ConfigManager::new(&db_path).unwrap();
        manager
            .set_config_value(config_keys::SCRIPT_MAX_OPERATIONS, "5000")
            .unwrap();
        manager
            .set_config_value(config_keys::PARETO_TIME_UNIT, "second")
            .unwrap();
    }

    let manager = ConfigManager::new(&db_path).unwrap();
    assert_eq!(manager.get_script_max_operations().unwrap(), 5_000);
    assert_eq!(manager.get_pareto_time_unit().unwrap(), TimeUnit::Second);
    assert!(manager.get_clamp_reduced_speed().unwrap());
}

#[test]
fn test_settings_load_from_reader() {
    let settings = EngineSettings::load(&MockConfig::unclamped()).unwrap();
    assert!(!settings.clamp_reduced_speed);
    assert_eq!(settings.script_pool_size, 2);

    let settings = EngineSettings::load(&MockConfig::in_seconds()).unwrap();
    assert_eq!(settings.pareto_time_unit, TimeUnit::Second);
    assert!(settings.clamp_reduced_speed);
}

#[test]
fn test_invalid_config_value_fails_open() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    ConfigManager::new(&db_path)
        .unwrap()
        .set_config_value(config_keys::CLAMP_REDUCED_SPEED, "sometimes")
        .unwrap();

    assert!(OeeApi::open(&db_path).is_err());
}

#[test]
fn test_open_reads_settings_and_runs_against_file() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    seed_press_line(&db_path).unwrap();
    ConfigManager::new(&db_path)
        .unwrap()
        .set_config_value(config_keys::CLAMP_REDUCED_SPEED, "false")
        .unwrap();

    let api = OeeApi::open(&db_path).unwrap();
    assert!(!api.settings().clamp_reduced_speed);

    api.resolve_signal("press7.count", &json!(0), at(6, 0)).unwrap();
    api.resolve_signal("press7.state", &json!("Running"), at(6, 0))
        .unwrap();
    api.resolve_signal("press7.state", &json!("Die Change"), at(7, 0))
        .unwrap();
    api.resolve_signal("press7.state", &json!("Running"), at(7, 30))
        .unwrap();
    // 2 小时 × 120/h 的设计产能被超出
    api.resolve_signal("press7.count", &json!(270), at(8, 0))
        .unwrap();

    let summary = api.calculate_losses("Press-7", at(6, 0), at(8, 0)).unwrap();

    // 净生产 90 分钟，合格 270 件折算 135 分钟
    assert_eq!(
        summary.loss_ms(LossCategory::ReducedSpeed),
        -45 * 60 * 1000
    );
    assert_eq!(summary.reduced_speed_excess_ms, Some(-45 * 60 * 1000));
    assert_eq!(summary.loss_ms(LossCategory::Setup), 30 * 60 * 1000);

    let total: i64 = summary.losses.iter().map(|b| b.duration_ms).sum();
    assert_eq!(total, summary.times.total_ms);

    // 新连接看到同样的事件
    drop(api);
    let reopened = OeeApi::open(&db_path).unwrap();
    let again = reopened
        .calculate_losses("Press-7", at(6, 0), at(8, 0))
        .unwrap();
    assert_eq!(again.times, summary.times);
}
