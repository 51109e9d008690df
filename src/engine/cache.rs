// ==========================================
// OEE 损失引擎 - 名称缓存
// ==========================================
// 职责: 原因/物料/设备 按名称缓存，未命中时从仓储加载
// 并发: 读多写少；未命中时持有分片写锁加载，同名并发只加载一次
// ==========================================

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug)]
pub struct NameCache<T> {
    entries: DashMap<String, T>,
}

impl<T> Default for NameCache<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T: Clone> NameCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 命中直接返回；未命中调用 loader，加载到值才写入缓存
    ///
    /// loader 返回 None 时不缓存，下次仍会重新加载
    pub fn get_or_load<E, F>(&self, name: &str, loader: F) -> Result<Option<T>, E>
    where
        F: FnOnce(&str) -> Result<Option<T>, E>,
    {
        if let Some(hit) = self.entries.get(name) {
            return Ok(Some(hit.clone()));
        }

        match self.entries.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Some(entry.get().clone())),
            Entry::Vacant(entry) => match loader(name)? {
                Some(value) => {
                    entry.insert(value.clone());
                    Ok(Some(value))
                }
                None => Ok(None),
            },
        }
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.entries.get(name).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
