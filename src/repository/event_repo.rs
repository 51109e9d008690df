// ==========================================
// OEE 损失引擎 - 解析事件仓储
// ==========================================
// 职责: 管理 oee_event 表
// 说明: 时间统一存储为 UTC 毫秒时间戳，便于区间查询
// 说明: 写入可用性事件时自动关闭同设备上一条未结束的可用性事件
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::{EventType, Material, Quantity, Reason, ResolvedEvent};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::oee_store::EventStore;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const EVENT_COLUMNS: &str = r#"
    event_id, equipment, event_type, source_id, start_ms, end_ms, duration_ms,
    reason_json, material_json, job, quantity_json, input_value_json,
    shift, team, lost_time_ms
"#;

/// 数据库原始行（JSON 列尚未解析）
struct EventRow {
    event_id: String,
    equipment: String,
    event_type: String,
    source_id: String,
    start_ms: i64,
    end_ms: Option<i64>,
    duration_ms: Option<i64>,
    reason_json: Option<String>,
    material_json: Option<String>,
    job: Option<String>,
    quantity_json: Option<String>,
    input_value_json: Option<String>,
    shift: Option<String>,
    team: Option<String>,
    lost_time_ms: Option<i64>,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            event_id: row.get(0)?,
            equipment: row.get(1)?,
            event_type: row.get(2)?,
            source_id: row.get(3)?,
            start_ms: row.get(4)?,
            end_ms: row.get(5)?,
            duration_ms: row.get(6)?,
            reason_json: row.get(7)?,
            material_json: row.get(8)?,
            job: row.get(9)?,
            quantity_json: row.get(10)?,
            input_value_json: row.get(11)?,
            shift: row.get(12)?,
            team: row.get(13)?,
            lost_time_ms: row.get(14)?,
        })
    }

    fn into_event(self) -> RepositoryResult<ResolvedEvent> {
        let event_type =
            EventType::parse(&self.event_type).ok_or_else(|| RepositoryError::FieldValueError {
                field: "event_type".to_string(),
                message: format!("未知事件类型: {} (event_id={})", self.event_type, self.event_id),
            })?;

        Ok(ResolvedEvent {
            event_id: self.event_id,
            equipment: self.equipment,
            event_type,
            source_id: self.source_id,
            start_time: from_millis("start_ms", self.start_ms)?,
            end_time: self
                .end_ms
                .map(|ms| from_millis("end_ms", ms))
                .transpose()?,
            duration_ms: self.duration_ms,
            reason: parse_json::<Reason>(self.reason_json)?,
            material: parse_json::<Material>(self.material_json)?,
            job: self.job,
            quantity: parse_json::<Quantity>(self.quantity_json)?,
            input_value: parse_json::<serde_json::Value>(self.input_value_json)?,
            shift: self.shift,
            team: self.team,
            lost_time_ms: self.lost_time_ms,
        })
    }
}

fn from_millis(field: &str, ms: i64) -> RepositoryResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| RepositoryError::FieldValueError {
        field: field.to_string(),
        message: format!("无效时间戳: {}", ms),
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(json: Option<String>) -> RepositoryResult<Option<T>> {
    match json {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

fn to_json<T: serde::Serialize>(value: Option<&T>) -> RepositoryResult<Option<String>> {
    match value {
        Some(v) => Ok(Some(serde_json::to_string(v)?)),
        None => Ok(None),
    }
}

pub struct OeeEventRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OeeEventRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        let repo = Self { conn };
        repo.ensure_table()?;
        Ok(repo)
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS oee_event (
              event_id TEXT PRIMARY KEY,
              equipment TEXT NOT NULL,
              event_type TEXT NOT NULL,
              source_id TEXT NOT NULL,
              start_ms INTEGER NOT NULL,
              end_ms INTEGER,
              duration_ms INTEGER,
              reason_json TEXT,
              material_json TEXT,
              job TEXT,
              quantity_json TEXT,
              input_value_json TEXT,
              shift TEXT,
              team TEXT,
              lost_time_ms INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_oee_event_equipment_type_start
              ON oee_event(equipment, event_type, start_ms);
            "#,
        )?;
        Ok(())
    }

    fn query_events(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> RepositoryResult<Vec<ResolvedEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, EventRow::from_row)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }

    /// 关闭设备上一条未结束的可用性事件（结束时间 = 新事件开始时间）
    fn close_open_availability(
        conn: &Connection,
        equipment: &str,
        until_ms: i64,
    ) -> RepositoryResult<usize> {
        let closed = conn.execute(
            r#"
            UPDATE oee_event
            SET end_ms = ?2, duration_ms = ?2 - start_ms
            WHERE equipment = ?1
              AND event_type = 'AVAILABILITY'
              AND end_ms IS NULL
              AND duration_ms IS NULL
              AND start_ms <= ?2
            "#,
            params![equipment, until_ms],
        )?;
        Ok(closed)
    }
}

impl EventStore for OeeEventRepository {
    fn insert_event(&self, event: &ResolvedEvent) -> RepositoryResult<()> {
        let start_ms = event.start_time.timestamp_millis();
        let end_ms = event.effective_end().map(|t| t.timestamp_millis());

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        if event.event_type == EventType::Availability {
            Self::close_open_availability(&tx, &event.equipment, start_ms)?;
        }

        tx.execute(
            &format!(
                "INSERT INTO oee_event ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                EVENT_COLUMNS
            ),
            params![
                event.event_id,
                event.equipment,
                event.event_type.as_str(),
                event.source_id,
                start_ms,
                end_ms,
                event.duration_ms,
                to_json(event.reason.as_ref())?,
                to_json(event.material.as_ref())?,
                event.job,
                to_json(event.quantity.as_ref())?,
                to_json(event.input_value.as_ref())?,
                event.shift,
                event.team,
                event.lost_time_ms,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn fetch_last_event(
        &self,
        equipment: &str,
        event_type: EventType,
    ) -> RepositoryResult<Option<ResolvedEvent>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM oee_event WHERE equipment = ?1 AND event_type = ?2
                     ORDER BY start_ms DESC LIMIT 1",
                    EVENT_COLUMNS
                ),
                params![equipment, event_type.as_str()],
                EventRow::from_row,
            )
            .optional()?;

        row.map(EventRow::into_event).transpose()
    }

    fn fetch_production_events(
        &self,
        equipment: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<ResolvedEvent>> {
        let sql = format!(
            r#"
            SELECT {} FROM oee_event
            WHERE equipment = ?1
              AND event_type IN ('PROD_GOOD', 'PROD_REJECT', 'PROD_STARTUP')
              AND start_ms <= ?3
              AND COALESCE(end_ms, start_ms) >= ?2
            ORDER BY start_ms ASC
            "#,
            EVENT_COLUMNS
        );
        self.query_events(
            &sql,
            params![equipment, from.timestamp_millis(), to.timestamp_millis()],
        )
    }

    fn fetch_availability_events(
        &self,
        equipment: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<ResolvedEvent>> {
        let sql = format!(
            r#"
            SELECT {} FROM oee_event
            WHERE equipment = ?1
              AND event_type = 'AVAILABILITY'
              AND start_ms < ?3
              AND (end_ms IS NULL OR end_ms > ?2)
            ORDER BY start_ms ASC
            "#,
            EVENT_COLUMNS
        );
        self.query_events(
            &sql,
            params![equipment, from.timestamp_millis(), to.timestamp_millis()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_connection;
    use crate::domain::{LossCategory, UnitOfMeasure};
    use chrono::{Duration, TimeZone};

    fn repo() -> OeeEventRepository {
        OeeEventRepository::from_connection(open_in_memory_connection().unwrap()).unwrap()
    }

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn availability(start: DateTime<Utc>, reason: &str, category: LossCategory) -> ResolvedEvent {
        let mut event = ResolvedEvent::new("Line-1", EventType::Availability, "S-AVAIL", start);
        event.reason = Some(Reason::new(reason, category));
        event
    }

    #[test]
    fn test_new_availability_event_closes_previous() {
        let repo = repo();
        repo.insert_event(&availability(t(8, 0), "Running", LossCategory::NoLoss)).unwrap();
        repo.insert_event(&availability(t(9, 30), "Jam", LossCategory::MinorStoppages)).unwrap();

        let events = repo.fetch_availability_events("Line-1", t(0, 0), t(23, 0)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].end_time, Some(t(9, 30)));
        assert_eq!(events[0].duration(), Some(Duration::minutes(90)));
        assert_eq!(events[1].end_time, None);
    }

    #[test]
    fn test_production_events_round_trip() {
        let repo = repo();
        let mut event = ResolvedEvent::new("Line-1", EventType::ProdGood, "S-GOOD", t(8, 15));
        event.quantity = Some(Quantity::new(42.0, UnitOfMeasure::count("units")));
        event.input_value = Some(serde_json::json!(142));
        event.job = Some("JOB-7".to_string());
        repo.insert_event(&event).unwrap();

        let events = repo.fetch_production_events("Line-1", t(8, 0), t(9, 0)).unwrap();
        assert_eq!(events, vec![event.clone()]);

        let outside = repo.fetch_production_events("Line-1", t(9, 0), t(10, 0)).unwrap();
        assert!(outside.is_empty());

        let last = repo.fetch_last_event("Line-1", EventType::ProdGood).unwrap().unwrap();
        assert_eq!(last.input_value, Some(serde_json::json!(142)));
    }
}
