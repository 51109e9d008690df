// ==========================================
// OEE 损失引擎 - 工作日历
// ==========================================
// 职责: 班次查找、非工作时间计算
// 约定: 班次列表为空表示连续生产（全天工作）
// ==========================================

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// 每日班次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub name: String,
    pub start: NaiveTime,
    pub duration_minutes: i64,
    /// 当班班组
    pub team: Option<String>,
}

/// 非工作时段（节假日、计划停产等）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonWorkingPeriod {
    pub name: String,
    pub start: NaiveDateTime,
    pub duration_minutes: i64,
}

/// 某一时刻所在的班次实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftInstance {
    pub shift: String,
    pub team: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSchedule {
    pub name: String,
    pub shifts: Vec<Shift>,
    pub non_working_periods: Vec<NonWorkingPeriod>,
}

type Interval = (NaiveDateTime, NaiveDateTime);

impl WorkSchedule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shifts: Vec::new(),
            non_working_periods: Vec::new(),
        }
    }

    /// 查找 at 时刻所在班次（跨零点班次从前一天开始计算）
    pub fn find_shift(&self, at: NaiveDateTime) -> Option<ShiftInstance> {
        let today = at.date();
        let days = [today.pred_opt().unwrap_or(today), today];

        for shift in &self.shifts {
            for day in days {
                let start = day.and_time(shift.start);
                let end = start + Duration::minutes(shift.duration_minutes);
                if start <= at && at < end {
                    return Some(ShiftInstance {
                        shift: shift.name.clone(),
                        team: shift.team.clone(),
                        start,
                        end,
                    });
                }
            }
        }
        None
    }

    /// 计算 [start, end) 内的非工作时间
    ///
    /// 非工作时间 = 不在任何班次内的时间 + 班次内的非工作时段（不重复计算）
    pub fn calculate_non_working_time(&self, start: NaiveDateTime, end: NaiveDateTime) -> Duration {
        if end <= start {
            return Duration::zero();
        }

        let mut working = self.shift_intervals(start, end);
        for period in &self.non_working_periods {
            let p_start = period.start.max(start);
            let p_end = (period.start + Duration::minutes(period.duration_minutes)).min(end);
            if p_start < p_end {
                working = subtract_interval(&working, (p_start, p_end));
            }
        }

        let worked = working
            .iter()
            .fold(Duration::zero(), |acc, (s, e)| acc + (*e - *s));
        (end - start) - worked
    }

    /// 窗口内的班次区间（已合并、已裁剪）
    fn shift_intervals(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<Interval> {
        if self.shifts.is_empty() {
            return vec![(start, end)];
        }

        let mut intervals = Vec::new();
        let mut day = start.date().pred_opt().unwrap_or(start.date());
        let last_day = end.date();

        while day <= last_day {
            for shift in &self.shifts {
                let s = day.and_time(shift.start);
                let e = s + Duration::minutes(shift.duration_minutes);
                let clipped = (s.max(start), e.min(end));
                if clipped.0 < clipped.1 {
                    intervals.push(clipped);
                }
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }

        merge_intervals(intervals)
    }
}

fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_by_key(|i| i.0);
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for (s, e) in intervals {
        match merged.last_mut() {
            Some(last) if s <= last.1 => last.1 = last.1.max(e),
            _ => merged.push((s, e)),
        }
    }
    merged
}

fn subtract_interval(intervals: &[Interval], cut: Interval) -> Vec<Interval> {
    let mut result = Vec::with_capacity(intervals.len() + 1);
    for &(s, e) in intervals {
        if cut.1 <= s || e <= cut.0 {
            result.push((s, e));
            continue;
        }
        if s < cut.0 {
            result.push((s, cut.0));
        }
        if cut.1 < e {
            result.push((cut.1, e));
        }
    }
    result
}
