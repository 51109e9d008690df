// ==========================================
// OEE 损失引擎 - 引擎参数快照
// ==========================================
// 用途: 启动时一次性读取配置，引擎内部只依赖纯值
// ==========================================

use crate::config::engine_config_trait::EngineConfigReader;
use crate::domain::TimeUnit;
use serde::{Deserialize, Serialize};
use std::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub clamp_reduced_speed: bool,
    pub script_max_operations: u64,
    pub script_pool_size: usize,
    pub pareto_time_unit: TimeUnit,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            clamp_reduced_speed: true,
            script_max_operations: 100_000,
            script_pool_size: 4,
            pareto_time_unit: TimeUnit::Minute,
        }
    }
}

impl EngineSettings {
    pub fn load<C: EngineConfigReader + ?Sized>(config: &C) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            clamp_reduced_speed: config.get_clamp_reduced_speed()?,
            script_max_operations: config.get_script_max_operations()?,
            script_pool_size: config.get_script_pool_size()?,
            pareto_time_unit: config.get_pareto_time_unit()?,
        })
    }
}
