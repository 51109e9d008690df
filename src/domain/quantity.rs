// ==========================================
// OEE 损失引擎 - 数量与计量单位
// ==========================================
// 职责: 带单位的数值（产量、时间、速率）
// 说明: 仅覆盖引擎所需的运算，不是通用计量库
// ==========================================

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 数量运算错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantityError {
    #[error("计量单位不一致: expected={expected}, actual={actual}")]
    UnitMismatch { expected: String, actual: String },

    #[error("不是速率单位: {0}")]
    NotARate(String),

    #[error("不是时间单位: {0}")]
    NotATime(String),

    #[error("除数为零: {0}")]
    DivisionByZero(String),

    #[error("时长超出可表示范围: {0}")]
    OutOfRange(String),
}

/// 单个时长的上限（约一万年，毫秒）
pub const MAX_DURATION_MS: i64 = 10_000 * 366 * 24 * 3600 * 1000;

// ==========================================
// 时间单位
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// 单位对应的秒数
    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Second => 1.0,
            TimeUnit::Minute => 60.0,
            TimeUnit::Hour => 3600.0,
            TimeUnit::Day => 86400.0,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TimeUnit::Second => "sec",
            TimeUnit::Minute => "min",
            TimeUnit::Hour => "hr",
            TimeUnit::Day => "day",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "SECOND" | "SEC" | "S" => Some(TimeUnit::Second),
            "MINUTE" | "MIN" => Some(TimeUnit::Minute),
            "HOUR" | "HR" | "H" => Some(TimeUnit::Hour),
            "DAY" => Some(TimeUnit::Day),
            _ => None,
        }
    }
}

// ==========================================
// 计量单位
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitOfMeasure {
    /// 时间
    Time { unit: TimeUnit },
    /// 计数/重量等产量单位，如 "units"、"kg"
    Count { symbol: String },
    /// 速率，如 units/hr
    Rate { symbol: String, per: TimeUnit },
}

impl UnitOfMeasure {
    pub fn count(symbol: &str) -> Self {
        UnitOfMeasure::Count {
            symbol: symbol.to_string(),
        }
    }

    pub fn rate(symbol: &str, per: TimeUnit) -> Self {
        UnitOfMeasure::Rate {
            symbol: symbol.to_string(),
            per,
        }
    }

    pub fn symbol(&self) -> String {
        match self {
            UnitOfMeasure::Time { unit } => unit.symbol().to_string(),
            UnitOfMeasure::Count { symbol } => symbol.clone(),
            UnitOfMeasure::Rate { symbol, per } => format!("{}/{}", symbol, per.symbol()),
        }
    }
}

impl fmt::Display for UnitOfMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// ==========================================
// Quantity - 带单位数值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub amount: f64,
    pub uom: UnitOfMeasure,
}

impl Quantity {
    pub fn new(amount: f64, uom: UnitOfMeasure) -> Self {
        Self { amount, uom }
    }

    /// 由时长构造时间数量
    pub fn from_duration(duration: Duration, unit: TimeUnit) -> Self {
        let seconds = duration.num_milliseconds() as f64 / 1000.0;
        Self::new(seconds / unit.seconds(), UnitOfMeasure::Time { unit })
    }

    pub fn add(&self, other: &Quantity) -> Result<Quantity, QuantityError> {
        let other = self.align(other)?;
        Ok(Quantity::new(self.amount + other.amount, self.uom.clone()))
    }

    pub fn subtract(&self, other: &Quantity) -> Result<Quantity, QuantityError> {
        let other = self.align(other)?;
        Ok(Quantity::new(self.amount - other.amount, self.uom.clone()))
    }

    pub fn multiply(&self, factor: f64) -> Quantity {
        Quantity::new(self.amount * factor, self.uom.clone())
    }

    /// 产量 ÷ 速率 = 时间（单位取速率的分母单位）
    pub fn divide_by_rate(&self, rate: &Quantity) -> Result<Quantity, QuantityError> {
        let (rate_symbol, per) = match &rate.uom {
            UnitOfMeasure::Rate { symbol, per } => (symbol, *per),
            other => return Err(QuantityError::NotARate(other.symbol())),
        };

        match &self.uom {
            UnitOfMeasure::Count { symbol } if symbol == rate_symbol => {}
            other => {
                return Err(QuantityError::UnitMismatch {
                    expected: rate_symbol.clone(),
                    actual: other.symbol(),
                })
            }
        }

        if rate.amount == 0.0 {
            return Err(QuantityError::DivisionByZero(rate.uom.symbol()));
        }

        Ok(Quantity::new(
            self.amount / rate.amount,
            UnitOfMeasure::Time { unit: per },
        ))
    }

    /// 速率 × 时长 = 产量
    pub fn rate_over(&self, duration: Duration) -> Result<Quantity, QuantityError> {
        match &self.uom {
            UnitOfMeasure::Rate { symbol, per } => {
                let time = Quantity::from_duration(duration, *per);
                Ok(Quantity::new(
                    self.amount * time.amount,
                    UnitOfMeasure::Count {
                        symbol: symbol.clone(),
                    },
                ))
            }
            other => Err(QuantityError::NotARate(other.symbol())),
        }
    }

    pub fn convert_time(&self, target: TimeUnit) -> Result<Quantity, QuantityError> {
        match &self.uom {
            UnitOfMeasure::Time { unit } => Ok(Quantity::new(
                self.amount * unit.seconds() / target.seconds(),
                UnitOfMeasure::Time { unit: target },
            )),
            other => Err(QuantityError::NotATime(other.symbol())),
        }
    }

    /// 时间数量转时长（毫秒精度，四舍五入；非有限值或超过 MAX_DURATION_MS 时报错）
    pub fn to_duration(&self) -> Result<Duration, QuantityError> {
        match &self.uom {
            UnitOfMeasure::Time { unit } => {
                let millis = (self.amount * unit.seconds() * 1000.0).round();
                if !millis.is_finite() || millis.abs() > MAX_DURATION_MS as f64 {
                    return Err(QuantityError::OutOfRange(self.to_string()));
                }
                Ok(Duration::milliseconds(millis as i64))
            }
            other => Err(QuantityError::NotATime(other.symbol())),
        }
    }

    /// 使 other 与 self 单位对齐（时间单位可互转，其余须一致）
    fn align(&self, other: &Quantity) -> Result<Quantity, QuantityError> {
        match (&self.uom, &other.uom) {
            (UnitOfMeasure::Time { unit }, UnitOfMeasure::Time { .. }) => other.convert_time(*unit),
            (a, b) if a == b => Ok(other.clone()),
            (a, b) => Err(QuantityError::UnitMismatch {
                expected: a.symbol(),
                actual: b.symbol(),
            }),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.uom)
    }
}
