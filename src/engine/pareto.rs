// ==========================================
// OEE 损失引擎 - 帕累托排序
// ==========================================
// 相等性按标签，数值比较走 ParetoItem::by_value；展示顺序由调用方决定
// ==========================================

use crate::domain::{LossCategory, Quantity, TimeUnit};
use crate::engine::accumulator::LossAccumulator;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParetoItem {
    pub category: String,
    pub value: f64,
}

impl ParetoItem {
    pub fn new(category: &str, value: f64) -> Self {
        Self {
            category: category.to_string(),
            value,
        }
    }

    fn from_duration(category: &str, duration: Duration, unit: TimeUnit) -> Self {
        Self::new(category, Quantity::from_duration(duration, unit).amount)
    }

    /// 按数值比较（与按标签的相等性无关，不实现 Ord）
    pub fn by_value(a: &ParetoItem, b: &ParetoItem) -> Ordering {
        a.value.total_cmp(&b.value)
    }
}

impl PartialEq for ParetoItem {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category
    }
}

impl Eq for ParetoItem {}

impl Hash for ParetoItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.category.hash(state);
    }
}

/// 某损失类别下按原因展开
///
/// 没有原因级记录的类别（如降速、非计划时间）整体作为一项
pub fn reason_pareto(
    accumulator: &LossAccumulator,
    category: LossCategory,
    unit: TimeUnit,
) -> Vec<ParetoItem> {
    let reasons = accumulator.reason_losses(category);
    if reasons.is_empty() {
        let total = accumulator.loss(category);
        if total > Duration::zero() {
            return vec![ParetoItem::from_duration(category.as_str(), total, unit)];
        }
        return Vec::new();
    }

    reasons
        .iter()
        .map(|(name, duration)| ParetoItem::from_duration(name, *duration, unit))
        .collect()
}

/// 真实损失类别汇总（不含 NO_LOSS / NOT_SCHEDULED / UNSCHEDULED，零值省略）
pub fn category_pareto(accumulator: &LossAccumulator, unit: TimeUnit) -> Vec<ParetoItem> {
    LossCategory::ALL
        .iter()
        .filter(|category| category.is_true_loss())
        .filter_map(|category| {
            let duration = accumulator.loss(*category);
            (duration > Duration::zero())
                .then(|| ParetoItem::from_duration(category.as_str(), duration, unit))
        })
        .collect()
}

/// 按数值降序
pub fn sort_descending(items: &mut [ParetoItem]) {
    items.sort_by(|a, b| ParetoItem::by_value(b, a));
}
