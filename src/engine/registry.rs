// ==========================================
// OEE 损失引擎 - 解析器配置注册表
// ==========================================
// 职责: 一次性加载全部解析器配置，按 source_id / 设备 索引
// 校验: 脚本为空或设备缺失的配置在加载时跳过
// 失效: invalidate() 后下一次查询重新加载
// ==========================================

use crate::domain::ResolverConfiguration;
use crate::engine::error::EngineResult;
use crate::repository::MasterDataStore;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

pub struct ResolverRegistry {
    store: Arc<dyn MasterDataStore>,
    by_source: DashMap<String, ResolverConfiguration>,
    by_equipment: DashMap<String, Vec<ResolverConfiguration>>,
    loaded: AtomicBool,
    // 串行化加载，避免并发首次查询重复加载
    load_lock: Mutex<()>,
}

impl ResolverRegistry {
    pub fn new(store: Arc<dyn MasterDataStore>) -> Self {
        Self {
            store,
            by_source: DashMap::new(),
            by_equipment: DashMap::new(),
            loaded: AtomicBool::new(false),
            load_lock: Mutex::new(()),
        }
    }

    /// 从仓储重新加载，返回有效配置数
    pub fn load(&self) -> EngineResult<usize> {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.reload()
    }

    /// 先写入新配置再剔除已删除的，读者不会看到空表
    fn reload(&self) -> EngineResult<usize> {
        let configs = self.store.fetch_event_resolvers()?;

        let mut by_equipment: HashMap<String, Vec<ResolverConfiguration>> = HashMap::new();
        let mut sources = HashSet::new();
        for config in configs {
            if let Err(problem) = validate(&config) {
                warn!(source_id = %config.source_id, problem, "解析器配置无效，已跳过");
                continue;
            }
            sources.insert(config.source_id.clone());
            by_equipment
                .entry(config.equipment.clone())
                .or_default()
                .push(config.clone());
            self.by_source.insert(config.source_id.clone(), config);
        }

        self.by_source.retain(|source_id, _| sources.contains(source_id));
        self.by_equipment
            .retain(|equipment, _| by_equipment.contains_key(equipment));
        for (equipment, list) in by_equipment {
            self.by_equipment.insert(equipment, list);
        }

        let accepted = sources.len();
        self.loaded.store(true, Ordering::Release);
        info!(count = accepted, "解析器配置已加载");
        Ok(accepted)
    }

    fn ensure_loaded(&self) -> EngineResult<()> {
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.loaded.load(Ordering::Acquire) {
            self.reload()?;
        }
        Ok(())
    }

    /// 按 source_id 查找
    pub fn get(&self, source_id: &str) -> EngineResult<Option<ResolverConfiguration>> {
        self.ensure_loaded()?;
        Ok(self.by_source.get(source_id).map(|c| c.clone()))
    }

    /// 设备下的全部配置
    pub fn for_equipment(&self, equipment: &str) -> EngineResult<Vec<ResolverConfiguration>> {
        self.ensure_loaded()?;
        Ok(self
            .by_equipment
            .get(equipment)
            .map(|list| list.clone())
            .unwrap_or_default())
    }

    /// 下一次查询时重新加载
    pub fn invalidate(&self) {
        self.loaded.store(false, Ordering::Release);
    }
}

fn validate(config: &ResolverConfiguration) -> Result<(), &'static str> {
    if config.source_id.trim().is_empty() {
        return Err("source_id 为空");
    }
    if config.equipment.trim().is_empty() {
        return Err("未关联设备");
    }
    if !config.has_script() {
        return Err("脚本为空");
    }
    Ok(())
}
