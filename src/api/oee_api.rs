// ==========================================
// OEE 损失引擎 - OEE API
// ==========================================
// 职责: 采集入口（信号解析+持久化）与报表入口（瀑布/帕累托/设备状态）
// 架构: API 层 → Engine 层 → Repository Trait
// 并发: 各方法可被多个采集线程/报表请求同时调用；
//       每次瀑布计算使用新的 LossAccumulator
// ==========================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, EngineSettings};
use crate::db::open_shared_connection;
use crate::domain::{
    EventType, LossCategory, LossComponent, Quantity, Reason, ResolvedEvent,
};
use crate::engine::{
    category_pareto, reason_pareto, sort_descending, EventResolver, ExecutionContext,
    InMemoryExecutionContext, LossAccumulator, LossWaterfallCalculator, ParetoItem,
    ResolverRegistry, ScriptInvoker,
};
use crate::repository::{EventStore, MasterDataRepository, MasterDataStore, OeeEventRepository};

// ==========================================
// 报表 DTO
// ==========================================

/// 单个损失桶
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossBucket {
    pub category: LossCategory,
    pub component: LossComponent,
    pub duration_ms: i64,
}

/// 瀑布各级时间（毫秒）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallTimes {
    pub total_ms: i64,
    pub required_operations_ms: i64,
    pub available_ms: i64,
    pub scheduled_production_ms: i64,
    pub production_ms: i64,
    pub reported_production_ms: i64,
    pub net_production_ms: i64,
    pub efficient_net_production_ms: i64,
    pub effective_net_production_ms: i64,
    pub value_adding_ms: i64,
}

/// 一次瀑布计算的汇总结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OeeSummary {
    pub equipment: String,
    pub material: Option<String>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// 观测窗口（由事件覆盖范围决定）
    pub observed_start: Option<DateTime<Utc>>,
    pub observed_end: Option<DateTime<Utc>>,
    pub losses: Vec<LossBucket>,
    pub times: WaterfallTimes,
    pub good_quantity: Option<Quantity>,
    pub reject_quantity: Option<Quantity>,
    pub startup_quantity: Option<Quantity>,
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
    pub high_level_oee: f64,
    /// 降速反推的负值（产量折算时间超出净生产时间）；截断模式下包含被截去的废品/开机损耗时间
    pub reduced_speed_excess_ms: Option<i64>,
}

impl OeeSummary {
    pub fn from_accumulator(
        acc: &LossAccumulator,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ApiResult<Self> {
        let losses = LossCategory::ALL
            .iter()
            .map(|category| LossBucket {
                category: *category,
                component: category.component(),
                duration_ms: acc.loss(*category).num_milliseconds(),
            })
            .collect();

        Ok(Self {
            equipment: acc.equipment().to_string(),
            material: acc.material().map(|m| m.name.clone()),
            from,
            to,
            observed_start: acc.start_date_time(),
            observed_end: acc.end_date_time(),
            losses,
            times: WaterfallTimes {
                total_ms: acc.total_time().num_milliseconds(),
                required_operations_ms: acc.required_operations_time().num_milliseconds(),
                available_ms: acc.available_time().num_milliseconds(),
                scheduled_production_ms: acc.scheduled_production_time().num_milliseconds(),
                production_ms: acc.production_time().num_milliseconds(),
                reported_production_ms: acc.reported_production_time().num_milliseconds(),
                net_production_ms: acc.net_production_time().num_milliseconds(),
                efficient_net_production_ms: acc
                    .efficient_net_production_time()
                    .num_milliseconds(),
                effective_net_production_ms: acc
                    .effective_net_production_time()
                    .num_milliseconds(),
                value_adding_ms: acc.value_adding_time().num_milliseconds(),
            },
            good_quantity: acc.good_quantity().cloned(),
            reject_quantity: acc.reject_quantity().cloned(),
            startup_quantity: acc.startup_quantity().cloned(),
            availability: acc.availability_percentage(),
            performance: acc.performance_percentage(),
            quality: acc.quality_percentage(),
            oee: acc.oee_percentage(),
            high_level_oee: acc.high_level_oee_percentage()?,
            reduced_speed_excess_ms: acc.reduced_speed_excess().map(|d| d.num_milliseconds()),
        })
    }

    pub fn loss_ms(&self, category: LossCategory) -> i64 {
        self.losses
            .iter()
            .find(|bucket| bucket.category == category)
            .map(|bucket| bucket.duration_ms)
            .unwrap_or(0)
    }
}

/// 设备当前状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentStatus {
    pub equipment: String,
    pub material: Option<String>,
    pub job: Option<String>,
    pub last_reason: Option<Reason>,
    pub last_reason_since: Option<DateTime<Utc>>,
}

// ==========================================
// OeeApi
// ==========================================
pub struct OeeApi {
    master_data: Arc<dyn MasterDataStore>,
    events: Arc<dyn EventStore>,
    registry: ResolverRegistry,
    resolver: EventResolver,
    calculator: LossWaterfallCalculator,
    settings: EngineSettings,
}

impl OeeApi {
    pub fn new(
        master_data: Arc<dyn MasterDataStore>,
        events: Arc<dyn EventStore>,
        context: Arc<dyn ExecutionContext>,
        settings: EngineSettings,
    ) -> Self {
        let registry = ResolverRegistry::new(master_data.clone());
        let resolver = EventResolver::new(
            master_data.clone(),
            events.clone(),
            context,
            ScriptInvoker::new(&settings),
        );
        let calculator = LossWaterfallCalculator::new(master_data.clone(), events.clone(), &settings);

        Self {
            master_data,
            events,
            registry,
            resolver,
            calculator,
            settings,
        }
    }

    /// 基于 SQLite 文件组装（仓储与配置共享同一连接）
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let conn = open_shared_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;

        let master_data = Arc::new(MasterDataRepository::from_connection(conn.clone())?);
        let events = Arc::new(OeeEventRepository::from_connection(conn.clone())?);
        let config = ConfigManager::from_connection(conn)
            .map_err(|e| ApiError::InternalError(format!("配置初始化失败: {}", e)))?;
        let settings = EngineSettings::load(&config)
            .map_err(|e| ApiError::InvalidInput(format!("配置读取失败: {}", e)))?;

        info!(db_path, ?settings, "OEE API 已初始化");
        Ok(Self::new(
            master_data,
            events,
            Arc::new(InMemoryExecutionContext::new()),
            settings,
        ))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ==========================================
    // 采集入口
    // ==========================================

    /// 解析一条原始信号并持久化
    pub fn resolve_signal(
        &self,
        source_id: &str,
        value: &serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> ApiResult<ResolvedEvent> {
        let config = self
            .registry
            .get(source_id)?
            .ok_or_else(|| ApiError::NotFound(format!("解析器配置(source_id={})不存在", source_id)))?;

        let event = self.resolver.resolve(&config, value, timestamp)?;
        self.events.insert_event(&event)?;

        debug!(source_id, event_id = %event.event_id, "事件已保存");
        Ok(event)
    }

    // ==========================================
    // 报表入口
    // ==========================================

    fn run_waterfall(
        &self,
        equipment: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ApiResult<LossAccumulator> {
        if to < from {
            return Err(ApiError::InvalidInput(format!(
                "区间无效: from={} 晚于 to={}",
                from, to
            )));
        }

        let mut accumulator = LossAccumulator::new(equipment);
        self.calculator.calculate(&mut accumulator, from, to)?;
        Ok(accumulator)
    }

    /// 计算设备在 [from, to] 的损失瀑布与 OEE
    pub fn calculate_losses(
        &self,
        equipment: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ApiResult<OeeSummary> {
        let accumulator = self.run_waterfall(equipment, from, to)?;
        OeeSummary::from_accumulator(&accumulator, from, to)
    }

    /// 帕累托（降序）
    ///
    /// category 为 None 时按真实损失类别汇总，否则按该类别下的原因展开
    pub fn loss_pareto(
        &self,
        equipment: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        category: Option<LossCategory>,
    ) -> ApiResult<Vec<ParetoItem>> {
        let accumulator = self.run_waterfall(equipment, from, to)?;
        let unit = self.settings.pareto_time_unit;

        let mut items = match category {
            Some(category) => reason_pareto(&accumulator, category, unit),
            None => category_pareto(&accumulator, unit),
        };
        sort_descending(&mut items);
        Ok(items)
    }

    /// 设备当前物料、工单、最近可用性原因
    pub fn equipment_status(&self, equipment: &str) -> ApiResult<EquipmentStatus> {
        if self.master_data.fetch_equipment_by_name(equipment)?.is_none() {
            return Err(ApiError::NotFound(format!("设备(name={})不存在", equipment)));
        }

        let snapshot = self.resolver.context().snapshot(equipment);
        let last = self
            .events
            .fetch_last_event(equipment, EventType::Availability)?;

        Ok(EquipmentStatus {
            equipment: equipment.to_string(),
            material: snapshot.material.map(|m| m.name),
            job: snapshot.job,
            last_reason_since: last.as_ref().map(|e| e.start_time),
            last_reason: last.and_then(|e| e.reason),
        })
    }

    /// 清空解析器配置、名称缓存和脚本编译缓存
    pub fn invalidate_caches(&self) {
        self.registry.invalidate();
        self.resolver.clear_caches();
        info!("缓存已清空");
    }

    /// 清空执行上下文（当前物料/工单）
    pub fn reset_context(&self) {
        self.resolver.context().reset();
    }
}
