// ==========================================
// Mock 配置实现 - 用于集成测试
// ==========================================

use oee_loss_engine::config::EngineConfigReader;
use oee_loss_engine::domain::TimeUnit;
use std::error::Error;

/// Mock 配置结构
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub clamp_reduced_speed: bool,
    pub script_max_operations: u64,
    pub script_pool_size: usize,
    pub pareto_time_unit: TimeUnit,
}

impl MockConfig {
    /// 创建默认配置
    pub fn default() -> Self {
        Self {
            clamp_reduced_speed: true,
            script_max_operations: 100_000,
            script_pool_size: 2,
            pareto_time_unit: TimeUnit::Minute,
        }
    }

    /// 降速负值不截断
    pub fn unclamped() -> Self {
        let mut config = Self::default();
        config.clamp_reduced_speed = false;
        config
    }

    /// 帕累托以秒为单位
    pub fn in_seconds() -> Self {
        let mut config = Self::default();
        config.pareto_time_unit = TimeUnit::Second;
        config
    }
}

impl EngineConfigReader for MockConfig {
    fn get_clamp_reduced_speed(&self) -> Result<bool, Box<dyn Error>> {
        Ok(self.clamp_reduced_speed)
    }

    fn get_script_max_operations(&self) -> Result<u64, Box<dyn Error>> {
        Ok(self.script_max_operations)
    }

    fn get_script_pool_size(&self) -> Result<usize, Box<dyn Error>> {
        Ok(self.script_pool_size)
    }

    fn get_pareto_time_unit(&self) -> Result<TimeUnit, Box<dyn Error>> {
        Ok(self.pareto_time_unit)
    }
}
