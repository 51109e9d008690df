// ==========================================
// OEE 损失引擎 - 损失累加器
// ==========================================
// 范围: 单台设备 + 单个评估窗口
// 内容: 十类损失时长、原因级时长、合格/废品/开机损耗数量、设计速度
// 瀑布: 总时间 → 需求运行 → 可用 → 计划生产 → 生产 → 报告生产
//       → 净生产 → 有效净生产 → 实际净生产 → 增值
// 约束: 降速损失不可直接测量，必须在全部数量累加完成后反推
// ==========================================

use crate::domain::{EventType, LossCategory, Material, Quantity, QuantityError, MAX_DURATION_MS};
use crate::engine::error::{EngineError, EngineResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct LossAccumulator {
    equipment: String,
    material: Option<Material>,
    start_date_time: Option<DateTime<Utc>>,
    end_date_time: Option<DateTime<Utc>>,
    losses: BTreeMap<LossCategory, Duration>,
    reason_losses: BTreeMap<LossCategory, BTreeMap<String, Duration>>,
    good_quantity: Option<Quantity>,
    reject_quantity: Option<Quantity>,
    startup_quantity: Option<Quantity>,
    design_speed: Option<Quantity>,
    reduced_speed_excess: Option<Duration>,
}

fn zeroed_losses() -> BTreeMap<LossCategory, Duration> {
    LossCategory::ALL
        .iter()
        .map(|category| (*category, Duration::zero()))
        .collect()
}

/// n / d × 100，分母非正时为 0
fn percentage(numerator: Duration, denominator: Duration) -> f64 {
    let d = denominator.num_milliseconds();
    if d <= 0 {
        return 0.0;
    }
    numerator.num_milliseconds() as f64 / d as f64 * 100.0
}

/// 累加时长，结果超出 ±MAX_DURATION_MS 时报错
fn bounded_sum(a: Duration, b: Duration) -> Result<Duration, QuantityError> {
    let sum = a.num_milliseconds() as i128 + b.num_milliseconds() as i128;
    if sum.abs() > MAX_DURATION_MS as i128 {
        return Err(QuantityError::OutOfRange(format!("{} ms", sum)));
    }
    Ok(Duration::milliseconds(sum as i64))
}

fn add_quantity(slot: &mut Option<Quantity>, quantity: &Quantity) -> Result<(), QuantityError> {
    *slot = Some(match slot.take() {
        Some(total) => total.add(quantity)?,
        None => quantity.clone(),
    });
    Ok(())
}

impl LossAccumulator {
    pub fn new(equipment: &str) -> Self {
        Self {
            equipment: equipment.to_string(),
            material: None,
            start_date_time: None,
            end_date_time: None,
            losses: zeroed_losses(),
            reason_losses: BTreeMap::new(),
            good_quantity: None,
            reject_quantity: None,
            startup_quantity: None,
            design_speed: None,
            reduced_speed_excess: None,
        }
    }

    pub fn equipment(&self) -> &str {
        &self.equipment
    }

    pub fn material(&self) -> Option<&Material> {
        self.material.as_ref()
    }

    pub fn set_material(&mut self, material: Option<Material>) {
        self.material = material;
    }

    pub fn start_date_time(&self) -> Option<DateTime<Utc>> {
        self.start_date_time
    }

    pub fn end_date_time(&self) -> Option<DateTime<Utc>> {
        self.end_date_time
    }

    /// 将观测窗口扩展到包含 [start, end]
    pub fn widen_window(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        let (start, end) = if end < start { (start, start) } else { (start, end) };
        self.start_date_time = Some(self.start_date_time.map_or(start, |s| s.min(start)));
        self.end_date_time = Some(self.end_date_time.map_or(end, |e| e.max(end)));
    }

    // ===== 损失桶 =====

    pub fn loss(&self, category: LossCategory) -> Duration {
        self.losses
            .get(&category)
            .copied()
            .unwrap_or_else(Duration::zero)
    }

    pub fn set_loss(&mut self, category: LossCategory, duration: Duration) {
        self.losses.insert(category, duration);
    }

    pub fn increment_loss(
        &mut self,
        category: LossCategory,
        duration: Duration,
    ) -> Result<(), QuantityError> {
        let total = bounded_sum(self.loss(category), duration)?;
        self.losses.insert(category, total);
        Ok(())
    }

    /// 记录原因级时长（不影响类别桶）
    pub fn record_reason_loss(
        &mut self,
        category: LossCategory,
        reason: &str,
        duration: Duration,
    ) -> Result<(), QuantityError> {
        let slot = self
            .reason_losses
            .entry(category)
            .or_default()
            .entry(reason.to_string())
            .or_insert_with(Duration::zero);
        *slot = bounded_sum(*slot, duration)?;
        Ok(())
    }

    /// 按比例把某类别的原因级时长缩放到 target，余数计入最后一个原因
    fn rescale_reason_losses(&mut self, category: LossCategory, target: Duration) {
        let Some(reasons) = self.reason_losses.get_mut(&category) else {
            return;
        };
        let original: i64 = reasons.values().map(|d| d.num_milliseconds()).sum();
        if original <= 0 {
            return;
        }

        let target_ms = target.num_milliseconds().max(0);
        let count = reasons.len();
        let mut assigned = 0i64;
        for (index, duration) in reasons.values_mut().enumerate() {
            let share = if index + 1 == count {
                target_ms - assigned
            } else {
                (duration.num_milliseconds() as f64 / original as f64 * target_ms as f64).round()
                    as i64
            };
            assigned += share;
            *duration = Duration::milliseconds(share);
        }
    }

    /// 某类别下各原因的时长（按原因名排序）
    pub fn reason_losses(&self, category: LossCategory) -> Vec<(String, Duration)> {
        self.reason_losses
            .get(&category)
            .map(|reasons| {
                reasons
                    .iter()
                    .map(|(name, duration)| (name.clone(), *duration))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ===== 数量 =====

    pub fn increment_quantity(
        &mut self,
        event_type: EventType,
        quantity: &Quantity,
    ) -> Result<(), QuantityError> {
        match event_type {
            EventType::ProdGood => add_quantity(&mut self.good_quantity, quantity),
            EventType::ProdReject => add_quantity(&mut self.reject_quantity, quantity),
            EventType::ProdStartup => add_quantity(&mut self.startup_quantity, quantity),
            _ => Ok(()),
        }
    }

    pub fn good_quantity(&self) -> Option<&Quantity> {
        self.good_quantity.as_ref()
    }

    pub fn reject_quantity(&self) -> Option<&Quantity> {
        self.reject_quantity.as_ref()
    }

    pub fn startup_quantity(&self) -> Option<&Quantity> {
        self.startup_quantity.as_ref()
    }

    pub fn design_speed(&self) -> Option<&Quantity> {
        self.design_speed.as_ref()
    }

    pub fn set_design_speed(&mut self, design_speed: Quantity) {
        self.design_speed = Some(design_speed);
    }

    /// 数量 ÷ 设计速度 → 时长
    pub fn convert_to_duration(&self, quantity: &Quantity) -> EngineResult<Duration> {
        let speed = self.design_speed.as_ref().ok_or_else(|| {
            EngineError::Configuration(format!("设备 {} 未设置设计速度", self.equipment))
        })?;
        Ok(quantity.divide_by_rate(speed)?.to_duration()?)
    }

    fn time_equivalent(&self, quantity: Option<&Quantity>) -> EngineResult<Duration> {
        match quantity {
            Some(q) => self.convert_to_duration(q),
            None => Ok(Duration::zero()),
        }
    }

    // ===== 瀑布 =====

    pub fn total_time(&self) -> Duration {
        match (self.start_date_time, self.end_date_time) {
            (Some(start), Some(end)) => end - start,
            _ => Duration::zero(),
        }
    }

    pub fn required_operations_time(&self) -> Duration {
        self.total_time() - self.loss(LossCategory::NotScheduled)
    }

    pub fn available_time(&self) -> Duration {
        self.required_operations_time() - self.loss(LossCategory::Unscheduled)
    }

    pub fn scheduled_production_time(&self) -> Duration {
        self.available_time() - self.loss(LossCategory::PlannedDowntime)
    }

    pub fn production_time(&self) -> Duration {
        self.scheduled_production_time() - self.loss(LossCategory::Setup)
    }

    pub fn reported_production_time(&self) -> Duration {
        self.production_time() - self.loss(LossCategory::UnplannedDowntime)
    }

    pub fn net_production_time(&self) -> Duration {
        self.reported_production_time() - self.loss(LossCategory::MinorStoppages)
    }

    pub fn efficient_net_production_time(&self) -> Duration {
        self.net_production_time() - self.loss(LossCategory::ReducedSpeed)
    }

    pub fn effective_net_production_time(&self) -> Duration {
        self.efficient_net_production_time() - self.loss(LossCategory::RejectRework)
    }

    pub fn value_adding_time(&self) -> Duration {
        self.effective_net_production_time() - self.loss(LossCategory::StartupYield)
    }

    /// 降速损失反推
    ///
    /// REDUCED_SPEED = 净生产时间 − 合格品折算时间 − 废品折算时间 − 开机损耗折算时间
    ///
    /// 废品/开机损耗两个桶在此按累计数量重新折算后写入，必须在全部数量累加之后调用。
    /// clamp 为 true 时负值写 0，原始负值保留在 reduced_speed_excess()；
    /// 若废品与开机损耗折算时间之和仍超过净生产时间，两桶依次截到净生产时间以内，
    /// 原因级时长同比例缩放，十个桶之和始终等于总时间。
    pub fn compute_reduced_speed(&mut self, clamp: bool) -> EngineResult<Duration> {
        let mut reject_time = self.time_equivalent(self.reject_quantity.as_ref())?;
        let mut startup_time = self.time_equivalent(self.startup_quantity.as_ref())?;
        let good_time = self.time_equivalent(self.good_quantity.as_ref())?;
        let net = self.net_production_time();

        let produced = bounded_sum(bounded_sum(good_time, reject_time)?, startup_time)?;
        let raw = bounded_sum(net, -produced)?;

        let reduced = if raw < Duration::zero() {
            warn!(
                equipment = %self.equipment,
                excess_ms = raw.num_milliseconds(),
                clamp,
                "降速损失反推为负，产量折算时间超过净生产时间"
            );
            self.reduced_speed_excess = Some(raw);
            if clamp {
                let room = net.max(Duration::zero());
                let capped_reject = reject_time.min(room);
                let capped_startup = startup_time.min(room - capped_reject);
                if capped_reject < reject_time {
                    self.rescale_reason_losses(LossCategory::RejectRework, capped_reject);
                }
                if capped_startup < startup_time {
                    self.rescale_reason_losses(LossCategory::StartupYield, capped_startup);
                }
                reject_time = capped_reject;
                startup_time = capped_startup;
                Duration::zero()
            } else {
                raw
            }
        } else {
            self.reduced_speed_excess = None;
            raw
        };

        self.set_loss(LossCategory::RejectRework, reject_time);
        self.set_loss(LossCategory::StartupYield, startup_time);
        self.set_loss(LossCategory::ReducedSpeed, reduced);
        Ok(reduced)
    }

    /// 降速反推的原始负值（未出现负值时为 None）
    pub fn reduced_speed_excess(&self) -> Option<Duration> {
        self.reduced_speed_excess
    }

    /// 十个桶之和
    pub fn sum_of_losses(&self) -> Duration {
        self.losses
            .values()
            .fold(Duration::zero(), |acc, d| acc + *d)
    }

    // ===== 百分比 =====

    pub fn availability_percentage(&self) -> f64 {
        percentage(self.reported_production_time(), self.available_time())
    }

    pub fn performance_percentage(&self) -> f64 {
        percentage(
            self.efficient_net_production_time(),
            self.reported_production_time(),
        )
    }

    pub fn quality_percentage(&self) -> f64 {
        percentage(self.value_adding_time(), self.efficient_net_production_time())
    }

    pub fn oee_percentage(&self) -> f64 {
        percentage(self.value_adding_time(), self.available_time())
    }

    /// 高层 OEE = 合格数量 / (可用时间 × 设计速度) × 100
    pub fn high_level_oee_percentage(&self) -> EngineResult<f64> {
        let (good, speed) = match (&self.good_quantity, &self.design_speed) {
            (Some(good), Some(speed)) => (good, speed),
            _ => return Ok(0.0),
        };

        let expected = speed.rate_over(self.available_time())?;
        if expected.uom != good.uom {
            return Err(QuantityError::UnitMismatch {
                expected: expected.uom.symbol(),
                actual: good.uom.symbol(),
            }
            .into());
        }
        if expected.amount <= 0.0 {
            return Ok(0.0);
        }
        Ok(good.amount / expected.amount * 100.0)
    }

    /// 清空累计结果，保留设备
    pub fn reset(&mut self) {
        *self = LossAccumulator::new(&self.equipment);
    }
}
