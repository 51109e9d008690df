// ==========================================
// OEE 损失引擎 - 主数据仓储
// ==========================================
// 职责: 管理 material / reason / equipment / equipment_material /
//       event_resolver / work_schedule 表
// 说明: 计量单位与工作日历以 JSON 存储
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::{
    Equipment, EquipmentMaterial, EventType, LossCategory, Material, Quantity, Reason,
    ResolverConfiguration, UnitOfMeasure, WorkSchedule,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::oee_store::MasterDataStore;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct MasterDataRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MasterDataRepository {
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

    /// 确保表存在（如果不存在则创建）
    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS material (
              name TEXT PRIMARY KEY,
              description TEXT,
              category TEXT
            );

            CREATE TABLE IF NOT EXISTS reason (
              name TEXT PRIMARY KEY,
              description TEXT,
              loss_category TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS equipment (
              name TEXT PRIMARY KEY,
              description TEXT
            );

            CREATE TABLE IF NOT EXISTS equipment_material (
              equipment TEXT NOT NULL,
              material TEXT NOT NULL,
              design_speed_json TEXT NOT NULL,
              reject_uom_json TEXT NOT NULL,
              run_rate_uom_json TEXT NOT NULL,
              is_default INTEGER NOT NULL DEFAULT 0,
              PRIMARY KEY (equipment, material),
              FOREIGN KEY (equipment) REFERENCES equipment(name) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS event_resolver (
              source_id TEXT PRIMARY KEY,
              equipment TEXT NOT NULL,
              event_type TEXT NOT NULL,
              script TEXT NOT NULL DEFAULT '',
              update_period_ms INTEGER NOT NULL DEFAULT 0,
              data_source TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_event_resolver_equipment
              ON event_resolver(equipment);

            CREATE TABLE IF NOT EXISTS work_schedule (
              equipment TEXT PRIMARY KEY,
              schedule_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    // ===== 写入 =====

    pub fn upsert_material(&self, material: &Material) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO material (name, description, category) VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                description = excluded.description,
                category = excluded.category
            "#,
            params![material.name, material.description, material.category],
        )?;
        Ok(())
    }

    pub fn upsert_reason(&self, reason: &Reason) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO reason (name, description, loss_category) VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                description = excluded.description,
                loss_category = excluded.loss_category
            "#,
            params![reason.name, reason.description, reason.loss_category.as_str()],
        )?;
        Ok(())
    }

    /// 写入设备及其全部设备-物料关联（整体替换，事务化）
    pub fn upsert_equipment(&self, equipment: &Equipment) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO equipment (name, description) VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET description = excluded.description
            "#,
            params![equipment.name, equipment.description],
        )?;
        tx.execute(
            "DELETE FROM equipment_material WHERE equipment = ?1",
            params![equipment.name],
        )?;

        for eqm in &equipment.materials {
            tx.execute(
                r#"
                INSERT INTO equipment_material (
                    equipment, material, design_speed_json,
                    reject_uom_json, run_rate_uom_json, is_default
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    equipment.name,
                    eqm.material,
                    serde_json::to_string(&eqm.design_speed)?,
                    serde_json::to_string(&eqm.reject_uom)?,
                    serde_json::to_string(&eqm.run_rate_uom)?,
                    eqm.is_default,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn upsert_resolver(&self, config: &ResolverConfiguration) -> RepositoryResult<()> {
        let update_period = i64::try_from(config.update_period_ms).map_err(|_| {
            RepositoryError::FieldValueError {
                field: "update_period_ms".to_string(),
                message: format!("超出范围: {}", config.update_period_ms),
            }
        })?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO event_resolver (
                source_id, equipment, event_type, script, update_period_ms, data_source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(source_id) DO UPDATE SET
                equipment = excluded.equipment,
                event_type = excluded.event_type,
                script = excluded.script,
                update_period_ms = excluded.update_period_ms,
                data_source = excluded.data_source
            "#,
            params![
                config.source_id,
                config.equipment,
                config.event_type.as_str(),
                config.script,
                update_period,
                config.data_source,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_work_schedule(
        &self,
        equipment: &str,
        schedule: &WorkSchedule,
    ) -> RepositoryResult<()> {
        let json = serde_json::to_string(schedule)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO work_schedule (equipment, schedule_json) VALUES (?1, ?2)
            ON CONFLICT(equipment) DO UPDATE SET schedule_json = excluded.schedule_json
            "#,
            params![equipment, json],
        )?;
        Ok(())
    }

    // ===== 读取辅助 =====

    fn load_equipment_materials(
        conn: &Connection,
        equipment: &str,
    ) -> RepositoryResult<Vec<EquipmentMaterial>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT material, design_speed_json, reject_uom_json, run_rate_uom_json, is_default
            FROM equipment_material
            WHERE equipment = ?1
            ORDER BY material
            "#,
        )?;

        let rows = stmt.query_map(params![equipment], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?;

        let mut materials = Vec::new();
        for row in rows {
            let (material, speed, reject, run_rate, is_default) = row?;
            materials.push(EquipmentMaterial {
                material,
                design_speed: serde_json::from_str::<Quantity>(&speed)?,
                reject_uom: serde_json::from_str::<UnitOfMeasure>(&reject)?,
                run_rate_uom: serde_json::from_str::<UnitOfMeasure>(&run_rate)?,
                is_default,
            });
        }
        Ok(materials)
    }
}

impl MasterDataStore for MasterDataRepository {
    fn fetch_event_resolvers(&self) -> RepositoryResult<Vec<ResolverConfiguration>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT source_id, equipment, event_type, script, update_period_ms, data_source
            FROM event_resolver
            ORDER BY source_id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut configs = Vec::new();
        for row in rows {
            let (source_id, equipment, event_type, script, update_period, data_source) = row?;

            let event_type =
                EventType::parse(&event_type).ok_or_else(|| RepositoryError::FieldValueError {
                    field: "event_type".to_string(),
                    message: format!("未知事件类型: {} (source_id={})", event_type, source_id),
                })?;
            let update_period_ms =
                u64::try_from(update_period).map_err(|_| RepositoryError::FieldValueError {
                    field: "update_period_ms".to_string(),
                    message: format!("不能为负数: {} (source_id={})", update_period, source_id),
                })?;

            configs.push(ResolverConfiguration {
                source_id,
                equipment,
                event_type,
                script,
                update_period_ms,
                data_source,
            });
        }
        Ok(configs)
    }

    fn fetch_reason_by_name(&self, name: &str) -> RepositoryResult<Option<Reason>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                "SELECT name, description, loss_category FROM reason WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((name, description, category)) => {
                let loss_category = LossCategory::parse(&category).ok_or_else(|| {
                    RepositoryError::FieldValueError {
                        field: "loss_category".to_string(),
                        message: format!("未知损失类别: {} (reason={})", category, name),
                    }
                })?;
                Ok(Some(Reason {
                    name,
                    description,
                    loss_category,
                }))
            }
            None => Ok(None),
        }
    }

    fn fetch_material_by_name(&self, name: &str) -> RepositoryResult<Option<Material>> {
        let conn = self.get_conn()?;
        let material = conn
            .query_row(
                "SELECT name, description, category FROM material WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Material {
                        name: row.get(0)?,
                        description: row.get(1)?,
                        category: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(material)
    }

    fn fetch_equipment_by_name(&self, name: &str) -> RepositoryResult<Option<Equipment>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                "SELECT name, description FROM equipment WHERE name = ?1",
                params![name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        match row {
            Some((name, description)) => {
                let materials = Self::load_equipment_materials(&conn, &name)?;
                Ok(Some(Equipment {
                    name,
                    description,
                    materials,
                }))
            }
            None => Ok(None),
        }
    }

    fn find_work_schedule(&self, equipment: &str) -> RepositoryResult<Option<WorkSchedule>> {
        let conn = self.get_conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT schedule_json FROM work_schedule WHERE equipment = ?1",
                params![equipment],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_connection;
    use crate::domain::TimeUnit;

    fn repo() -> MasterDataRepository {
        MasterDataRepository::from_connection(open_in_memory_connection().unwrap()).unwrap()
    }

    #[test]
    fn test_equipment_round_trip_with_materials() {
        let repo = repo();
        let mut eq = Equipment::new("Line-1");
        eq.materials.push(EquipmentMaterial {
            material: "Widget".to_string(),
            design_speed: Quantity::new(100.0, UnitOfMeasure::rate("units", TimeUnit::Hour)),
            reject_uom: UnitOfMeasure::count("units"),
            run_rate_uom: UnitOfMeasure::count("units"),
            is_default: true,
        });
        repo.upsert_equipment(&eq).unwrap();

        let loaded = repo.fetch_equipment_by_name("Line-1").unwrap().unwrap();
        assert_eq!(loaded, eq);
        assert!(repo.fetch_equipment_by_name("Line-2").unwrap().is_none());
    }

    #[test]
    fn test_reason_and_material_lookup() {
        let repo = repo();
        repo.upsert_reason(&Reason::new("Jam", LossCategory::MinorStoppages)).unwrap();
        repo.upsert_material(&Material::new("Widget")).unwrap();

        let reason = repo.fetch_reason_by_name("Jam").unwrap().unwrap();
        assert_eq!(reason.loss_category, LossCategory::MinorStoppages);
        assert!(repo.fetch_reason_by_name("Unknown").unwrap().is_none());
        assert!(repo.fetch_material_by_name("Widget").unwrap().is_some());
    }

    #[test]
    fn test_negative_update_period_is_rejected_on_load() {
        let repo = repo();
        {
            let conn = repo.get_conn().unwrap();
            conn.execute(
                "INSERT INTO event_resolver (source_id, equipment, event_type, script, update_period_ms)
                 VALUES ('S1', 'Line-1', 'PROD_GOOD', 'value', -5)",
                [],
            )
            .unwrap();
        }
        let err = repo.fetch_event_resolvers().unwrap_err();
        assert!(matches!(err, RepositoryError::FieldValueError { .. }));
    }

    #[test]
    fn test_work_schedule_round_trip() {
        let repo = repo();
        let schedule = WorkSchedule::new("24x7");
        repo.upsert_work_schedule("Line-1", &schedule).unwrap();
        assert_eq!(repo.find_work_schedule("Line-1").unwrap(), Some(schedule));
        assert_eq!(repo.find_work_schedule("Line-2").unwrap(), None);
    }
}
