// ==========================================
// OEE 损失引擎 - 损失瀑布计算器
// ==========================================
// 输入: 设备 + 区间 [from, to]
// 步骤:
//   1. 工作日历 / 设计速度（缺失则整个计算失败）
//   2. 产量事件 → 数量累加，废品/开机损耗折算损失时间（审计）
//   3. 可用性事件 → 首尾裁剪后按原因类别累加
//   4. NOT_SCHEDULED ← 观测窗口内的非工作时间
//   5. REDUCED_SPEED ← 反推（依赖 2~4 全部完成）
//   6. NO_LOSS ← 剩余增值时间
// ==========================================

use crate::config::EngineSettings;
use crate::domain::{Equipment, EventType, LossCategory, Material, ResolvedEvent, WorkSchedule};
use crate::engine::accumulator::LossAccumulator;
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::{EventStore, MasterDataStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct LossWaterfallCalculator {
    master_data: Arc<dyn MasterDataStore>,
    events: Arc<dyn EventStore>,
    clamp_reduced_speed: bool,
}

impl LossWaterfallCalculator {
    pub fn new(
        master_data: Arc<dyn MasterDataStore>,
        events: Arc<dyn EventStore>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            master_data,
            events,
            clamp_reduced_speed: settings.clamp_reduced_speed,
        }
    }

    /// 计算设备在 [from, to] 的损失瀑布
    ///
    /// 返回裁剪/折算后的产量事件（lost_time 已填充），结果写入 accumulator
    pub fn calculate(
        &self,
        accumulator: &mut LossAccumulator,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<ResolvedEvent>> {
        let equipment_name = accumulator.equipment().to_string();
        info!(equipment = %equipment_name, %from, %to, "开始计算损失瀑布");

        let schedule = self.work_schedule(&equipment_name)?;
        let equipment = self
            .master_data
            .fetch_equipment_by_name(&equipment_name)?
            .ok_or_else(|| {
                EngineError::Configuration(format!("设备不存在: {}", equipment_name))
            })?;

        // 1. 设计速度
        self.apply_design_speed(accumulator, &equipment)?;

        // 2. 产量事件
        let production = self.accumulate_production(accumulator, from, to)?;

        // 3. 可用性事件
        self.accumulate_availability(accumulator, from, to)?;

        // 4. 非计划时间（基于观测窗口）
        // 须在降速反推之前写入：净生产时间要先扣除 NOT_SCHEDULED
        if let (Some(start), Some(end)) =
            (accumulator.start_date_time(), accumulator.end_date_time())
        {
            let not_scheduled =
                schedule.calculate_non_working_time(start.naive_utc(), end.naive_utc());
            accumulator.set_loss(LossCategory::NotScheduled, not_scheduled);
        }

        // 5. 降速反推
        accumulator.compute_reduced_speed(self.clamp_reduced_speed)?;

        // 6. 增值时间
        let value_adding = accumulator.value_adding_time().max(Duration::zero());
        accumulator.set_loss(LossCategory::NoLoss, value_adding);

        info!(
            equipment = %equipment_name,
            total_min = accumulator.total_time().num_minutes(),
            value_adding_min = value_adding.num_minutes(),
            oee = accumulator.oee_percentage(),
            "损失瀑布计算完成"
        );
        Ok(production)
    }

    fn work_schedule(&self, equipment: &str) -> EngineResult<WorkSchedule> {
        self.master_data
            .find_work_schedule(equipment)?
            .ok_or_else(|| {
                EngineError::Configuration(format!("设备 {} 未配置工作日历", equipment))
            })
    }

    /// 物料取累加器已有物料，否则取设备默认物料
    fn apply_design_speed(
        &self,
        accumulator: &mut LossAccumulator,
        equipment: &Equipment,
    ) -> EngineResult<()> {
        let material_name = match accumulator.material() {
            Some(material) => material.name.clone(),
            None => equipment
                .default_equipment_material()
                .map(|em| em.material.clone())
                .ok_or_else(|| {
                    EngineError::Configuration(format!(
                        "设备 {} 未指定物料且无默认物料",
                        equipment.name
                    ))
                })?,
        };

        let equipment_material = equipment.equipment_material(&material_name).ok_or_else(|| {
            EngineError::Configuration(format!(
                "设备 {} 未配置物料 {} 的设计速度",
                equipment.name, material_name
            ))
        })?;
        accumulator.set_design_speed(equipment_material.design_speed.clone());

        if accumulator.material().is_none() {
            let material = self
                .master_data
                .fetch_material_by_name(&material_name)?
                .unwrap_or_else(|| Material::new(&material_name));
            accumulator.set_material(Some(material));
        }
        Ok(())
    }

    fn accumulate_production(
        &self,
        accumulator: &mut LossAccumulator,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<ResolvedEvent>> {
        let mut events =
            self.events
                .fetch_production_events(accumulator.equipment(), from, to)?;

        for event in events.iter_mut() {
            let quantity = match &event.quantity {
                Some(q) => q.clone(),
                None => {
                    warn!(event_id = %event.event_id, "产量事件缺少数量，已跳过");
                    continue;
                }
            };

            let start = event.start_time.max(from);
            let end = event.effective_end().unwrap_or(event.start_time).min(to);
            accumulator.widen_window(start, end.max(start));

            accumulator.increment_quantity(event.event_type, &quantity)?;

            let category = match event.event_type {
                EventType::ProdReject => LossCategory::RejectRework,
                EventType::ProdStartup => LossCategory::StartupYield,
                _ => continue,
            };
            let lost = accumulator.convert_to_duration(&quantity)?;
            event.set_lost_time(lost);

            let label = event
                .reason
                .as_ref()
                .map(|r| r.name.clone())
                .unwrap_or_else(|| category.as_str().to_string());
            accumulator.record_reason_loss(category, &label, lost)?;
        }

        debug!(
            equipment = %accumulator.equipment(),
            count = events.len(),
            "产量事件已累加"
        );
        Ok(events)
    }

    /// 只裁剪序列的第一条和最后一条，中间事件视为已完全落在区间内
    fn accumulate_availability(
        &self,
        accumulator: &mut LossAccumulator,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<()> {
        let events = self
            .events
            .fetch_availability_events(accumulator.equipment(), from, to)?;
        let last_index = events.len().saturating_sub(1);

        for (index, event) in events.iter().enumerate() {
            let reason = match &event.reason {
                Some(reason) => reason,
                None => {
                    warn!(event_id = %event.event_id, "可用性事件缺少原因，已跳过");
                    continue;
                }
            };

            let mut start = event.start_time;
            if index == 0 && start < from {
                start = from;
            }

            let end = if index == last_index {
                match event.effective_end() {
                    Some(end) if end <= to => end,
                    _ => to,
                }
            } else {
                match event.effective_end() {
                    Some(end) => end,
                    None => {
                        warn!(
                            event_id = %event.event_id,
                            reason = %reason.name,
                            "中间可用性事件无结束时间，按 0 计"
                        );
                        continue;
                    }
                }
            };

            // 推导类别的状态时长按运行计，由降速反推分配
            let category = if reason.loss_category.is_derived() {
                debug!(
                    event_id = %event.event_id,
                    reason = %reason.name,
                    category = %reason.loss_category.as_str(),
                    "可用性事件原因属于推导类别，按运行时间计"
                );
                LossCategory::NoLoss
            } else {
                reason.loss_category
            };

            let duration = (end - start).max(Duration::zero());
            accumulator.increment_loss(category, duration)?;
            accumulator.record_reason_loss(category, &reason.name, duration)?;
            accumulator.widen_window(start, end.max(start));
        }

        debug!(
            equipment = %accumulator.equipment(),
            count = events.len(),
            "可用性事件已累加"
        );
        Ok(())
    }
}
