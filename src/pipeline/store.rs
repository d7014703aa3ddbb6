//! 资源状态存储：资源 ID -> 快照
//!
//! 值是不可变的 Arc，set 整体替换，读方只会看到替换前或替换后的完整快照。
//! range 先在读锁下拷出 (id, Arc) 列表再逐个访问，访问期间不持锁。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::pipeline::ResourceSnapshot;

#[derive(Debug, Default)]
pub struct ResourceStore {
    items: RwLock<HashMap<String, Arc<ResourceSnapshot>>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取一份可修改的拷贝；修改后用 set 写回（后写者胜）
    pub async fn get(&self, id: &str) -> Option<ResourceSnapshot> {
        self.items
            .read()
            .await
            .get(id)
            .map(|snapshot| ResourceSnapshot::clone(snapshot))
    }

    pub async fn set(&self, id: impl Into<String>, snapshot: ResourceSnapshot) {
        self.items
            .write()
            .await
            .insert(id.into(), Arc::new(snapshot));
    }

    /// 在写锁内读改写一个快照，返回 edit 的结果；ID 不存在时返回 None
    pub async fn update<R>(
        &self,
        id: &str,
        edit: impl FnOnce(&mut ResourceSnapshot) -> R,
    ) -> Option<(ResourceSnapshot, R)> {
        let mut items = self.items.write().await;
        let slot = items.get_mut(id)?;
        let mut snapshot = ResourceSnapshot::clone(slot);
        let result = edit(&mut snapshot);
        *slot = Arc::new(snapshot.clone());
        Some((snapshot, result))
    }

    /// 遍历某一时刻的全部快照；visit 返回 false 时提前结束
    pub async fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &ResourceSnapshot) -> bool,
    {
        let entries: Vec<(String, Arc<ResourceSnapshot>)> = self
            .items
            .read()
            .await
            .iter()
            .map(|(id, snapshot)| (id.clone(), Arc::clone(snapshot)))
            .collect();
        for (id, snapshot) in &entries {
            if !visit(id, snapshot) {
                break;
            }
        }
    }

    /// 按 ID 排序的全部快照
    pub async fn snapshots(&self) -> Vec<Arc<ResourceSnapshot>> {
        let mut all: Vec<Arc<ResourceSnapshot>> =
            self.items.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.items.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
