//! 仓储抽象
//!
//! 核心组件通过注入的仓储接口访问实体，而不是共享的全局可变状态；
//! 内存实现用于测试和单进程部署，可替换为真实数据存储。

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::{MedmisError, Result};

/// 可被仓储管理的实体
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
}

/// 通用仓储接口（对象安全，可以 `Arc<dyn Repository<T>>` 注入）
pub trait Repository<T: Entity>: Send + Sync {
    /// 插入新实体，id 已存在时返回 `Conflict`
    fn insert(&self, entity: T) -> Result<()>;

    /// 读取实体，不存在时返回 `NotFound`
    fn get(&self, id: Uuid) -> Result<T>;

    /// 读取实体，不存在时返回 None
    fn find(&self, id: Uuid) -> Option<T>;

    /// 在写锁内原子地读改写一个实体，返回更新后的副本
    ///
    /// 闭包返回错误时实体保持原状（无部分效果）。
    fn update(&self, id: Uuid, mutate: &mut dyn FnMut(&mut T) -> Result<()>) -> Result<T>;

    /// 删除实体并返回之
    fn remove(&self, id: Uuid) -> Result<T>;

    /// 全量列举
    fn list(&self) -> Vec<T>;

    /// 按谓词筛选
    fn select(&self, predicate: &dyn Fn(&T) -> bool) -> Vec<T>;
}

/// 内存仓储实现
#[derive(Debug)]
pub struct InMemoryRepository<T> {
    items: RwLock<HashMap<Uuid, T>>,
}

impl<T> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    fn insert(&self, entity: T) -> Result<()> {
        let mut items = self.items.write().expect("repo lock poisoned");
        let id = entity.id();
        if items.contains_key(&id) {
            return Err(MedmisError::Conflict(format!("entity {} already exists", id)));
        }
        items.insert(id, entity);
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<T> {
        self.find(id)
            .ok_or_else(|| MedmisError::NotFound(format!("entity {} not found", id)))
    }

    fn find(&self, id: Uuid) -> Option<T> {
        let items = self.items.read().expect("repo lock poisoned");
        items.get(&id).cloned()
    }

    fn update(&self, id: Uuid, mutate: &mut dyn FnMut(&mut T) -> Result<()>) -> Result<T> {
        let mut items = self.items.write().expect("repo lock poisoned");
        let entity = items
            .get_mut(&id)
            .ok_or_else(|| MedmisError::NotFound(format!("entity {} not found", id)))?;

        // 先在副本上应用变更，失败时不落盘
        let mut draft = entity.clone();
        mutate(&mut draft)?;
        *entity = draft.clone();
        Ok(draft)
    }

    fn remove(&self, id: Uuid) -> Result<T> {
        let mut items = self.items.write().expect("repo lock poisoned");
        items
            .remove(&id)
            .ok_or_else(|| MedmisError::NotFound(format!("entity {} not found", id)))
    }

    fn list(&self) -> Vec<T> {
        let items = self.items.read().expect("repo lock poisoned");
        items.values().cloned().collect()
    }

    fn select(&self, predicate: &dyn Fn(&T) -> bool) -> Vec<T> {
        let items = self.items.read().expect("repo lock poisoned");
        items.values().filter(|e| predicate(e)).cloned().collect()
    }
}

// 核心实体的仓储标识
impl Entity for crate::models::Room {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for crate::models::QueueItem {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for crate::models::Study {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for crate::models::Referral {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for crate::models::PatientBooking {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PatientHint, Referral, ReferralStatus};
    use chrono::Utc;

    fn sample_referral() -> Referral {
        Referral {
            id: Uuid::new_v4(),
            referrer_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            qr_code: "QR-REF-001".into(),
            short_code: "RF0001".into(),
            patient_hint: PatientHint {
                name: "John Doe".into(),
                complaint: "headache".into(),
            },
            status: ReferralStatus::Yellow,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let repo = InMemoryRepository::new();
        let referral = sample_referral();
        let id = referral.id;
        repo.insert(referral).unwrap();
        assert_eq!(repo.get(id).unwrap().short_code, "RF0001");
    }

    #[test]
    fn test_duplicate_insert_conflicts() {
        let repo = InMemoryRepository::new();
        let referral = sample_referral();
        repo.insert(referral.clone()).unwrap();
        assert!(matches!(
            repo.insert(referral),
            Err(MedmisError::Conflict(_))
        ));
    }

    #[test]
    fn test_update_rolls_back_on_error() {
        let repo = InMemoryRepository::new();
        let referral = sample_referral();
        let id = referral.id;
        repo.insert(referral).unwrap();

        let result = repo.update(id, &mut |r: &mut Referral| {
            r.status = ReferralStatus::Green;
            Err(MedmisError::Validation("boom".into()))
        });
        assert!(result.is_err());
        // 失败的变更不得留下部分效果
        assert_eq!(repo.get(id).unwrap().status, ReferralStatus::Yellow);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let repo: InMemoryRepository<Referral> = InMemoryRepository::new();
        assert!(matches!(
            repo.get(Uuid::new_v4()),
            Err(MedmisError::NotFound(_))
        ));
    }
}
