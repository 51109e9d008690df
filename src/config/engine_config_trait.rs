// ==========================================
// OEE 损失引擎 - 引擎配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::TimeUnit;
use std::error::Error;

// ==========================================
// EngineConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
pub trait EngineConfigReader: Send + Sync {
    // ===== 损失瀑布 =====

    /// 降速损失反推为负时是否截断为 0
    ///
    /// # 默认值
    /// - true
    fn get_clamp_reduced_speed(&self) -> Result<bool, Box<dyn Error>>;

    // ===== 脚本执行 =====

    /// 单次脚本调用允许的最大操作数（沙箱预算）
    ///
    /// # 默认值
    /// - 100000
    fn get_script_max_operations(&self) -> Result<u64, Box<dyn Error>>;

    /// 预热的脚本执行器数量
    ///
    /// # 默认值
    /// - 4
    fn get_script_pool_size(&self) -> Result<usize, Box<dyn Error>>;

    // ===== 报表 =====

    /// 帕累托数值所用时间单位
    ///
    /// # 默认值
    /// - MINUTE
    fn get_pareto_time_unit(&self) -> Result<TimeUnit, Box<dyn Error>>;
}
