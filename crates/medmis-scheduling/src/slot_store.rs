//! 号源存储
//!
//! 容量占用的唯一事实来源。所有变更按 (检查室, 日期) 持锁串行化，
//! 跨检查室操作互不阻塞。预约在满员时快速失败，调用方重读后重试
//! 或换号源，不排队等待。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::NaiveDate;
use uuid::Uuid;

use medmis_core::{format_hhmm, has_internal_overlap, Blackout, MedmisError, Result, Slot};

/// 检查室单日状态：号源网格加停诊窗口
#[derive(Debug, Default)]
struct RoomDay {
    slots: Vec<Slot>,
    blackouts: Vec<Blackout>,
}

impl RoomDay {
    fn slot_mut(&mut self, slot_id: Uuid) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == slot_id)
    }

    fn sorted_slots(&self) -> Vec<Slot> {
        let mut slots = self.slots.clone();
        slots.sort_by_key(|s| s.start_at);
        slots
    }
}

type DayKey = (Uuid, NaiveDate);

/// 号源存储
///
/// 每个 (检查室, 日期) 对应一把独立互斥锁；外层读写锁只保护
/// 键表本身，持有单日锁期间不占用外层锁。
#[derive(Debug, Default)]
pub struct SlotStore {
    days: RwLock<HashMap<DayKey, Arc<Mutex<RoomDay>>>>,
    slot_index: RwLock<HashMap<Uuid, DayKey>>,
}

impl SlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn day_handle(&self, room_id: Uuid, date: NaiveDate) -> Arc<Mutex<RoomDay>> {
        let key = (room_id, date);
        {
            let days = self.days.read().expect("slot store lock poisoned");
            if let Some(day) = days.get(&key) {
                return Arc::clone(day);
            }
        }
        let mut days = self.days.write().expect("slot store lock poisoned");
        Arc::clone(days.entry(key).or_default())
    }

    fn existing_day(&self, room_id: Uuid, date: NaiveDate) -> Option<Arc<Mutex<RoomDay>>> {
        let days = self.days.read().expect("slot store lock poisoned");
        days.get(&(room_id, date)).map(Arc::clone)
    }

    fn locate(&self, slot_id: Uuid) -> Result<DayKey> {
        let index = self.slot_index.read().expect("slot store lock poisoned");
        index
            .get(&slot_id)
            .copied()
            .ok_or_else(|| MedmisError::NotFound(format!("slot {}", slot_id)))
    }

    fn index_insert(&self, slot_id: Uuid, key: DayKey) {
        let mut index = self.slot_index.write().expect("slot store lock poisoned");
        index.insert(slot_id, key);
    }

    fn index_remove(&self, slot_ids: &[Uuid]) {
        let mut index = self.slot_index.write().expect("slot store lock poisoned");
        for id in slot_ids {
            index.remove(id);
        }
    }

    /// 安装某日的标准号源网格，幂等
    ///
    /// 只安装与已有号源和停诊窗口都不相交的候选单元，已有号源的
    /// taken 计数原样保留。返回本次实际新增的号源。
    pub fn ensure_day(
        &self,
        room_id: Uuid,
        date: NaiveDate,
        quanta: Vec<Slot>,
    ) -> Result<Vec<Slot>> {
        let day = self.day_handle(room_id, date);
        let mut day = day.lock().expect("room day lock poisoned");

        let mut installed = Vec::new();
        for slot in quanta {
            let clashes = day
                .slots
                .iter()
                .any(|s| s.intersects(slot.start_at, slot.end_at))
                || day
                    .blackouts
                    .iter()
                    .any(|b| slot.intersects(b.from, b.to));
            if clashes {
                continue;
            }
            self.index_insert(slot.id, (room_id, date));
            day.slots.push(slot.clone());
            installed.push(slot);
        }
        if !installed.is_empty() {
            tracing::debug!(
                room_id = %room_id,
                %date,
                count = installed.len(),
                "Installed slot quanta"
            );
        }
        Ok(installed)
    }

    /// 预约一个号源，原子递增 taken
    pub fn reserve(&self, slot_id: Uuid) -> Result<Slot> {
        let (room_id, date) = self.locate(slot_id)?;
        let day = self.day_handle(room_id, date);
        let mut day = day.lock().expect("room day lock poisoned");

        let slot = day
            .slot_mut(slot_id)
            .ok_or_else(|| MedmisError::NotFound(format!("slot {}", slot_id)))?;
        if slot.is_full() {
            return Err(MedmisError::SlotFull(format!(
                "slot {} at {}",
                slot_id,
                format_hhmm(slot.start_at)
            )));
        }
        slot.taken += 1;
        Ok(slot.clone())
    }

    /// 释放一个号源占用，taken 下限为 0
    pub fn release(&self, slot_id: Uuid) -> Result<Slot> {
        let (room_id, date) = self.locate(slot_id)?;
        let day = self.day_handle(room_id, date);
        let mut day = day.lock().expect("room day lock poisoned");

        let slot = day
            .slot_mut(slot_id)
            .ok_or_else(|| MedmisError::NotFound(format!("slot {}", slot_id)))?;
        slot.taken = slot.taken.saturating_sub(1);
        Ok(slot.clone())
    }

    /// 替换某日的号源网格
    ///
    /// 时间段不变的号源保留原 id 与 taken 计数；已有预约的号源在新
    /// 网格中消失即拒绝，新容量低于已预约数也拒绝，绝不静默取消
    /// 预约。
    pub fn resize(&self, room_id: Uuid, date: NaiveDate, new_slots: Vec<Slot>) -> Result<Vec<Slot>> {
        let ranges: Vec<_> = new_slots.iter().map(|s| (s.start_at, s.end_at)).collect();
        if has_internal_overlap(&ranges) {
            return Err(MedmisError::Overlap(format!(
                "new grid for room {} on {}",
                room_id, date
            )));
        }

        let day = self.day_handle(room_id, date);
        let mut day = day.lock().expect("room day lock poisoned");

        let mut merged = Vec::with_capacity(new_slots.len());
        for mut slot in new_slots {
            let existing = day
                .slots
                .iter()
                .find(|s| s.start_at == slot.start_at && s.end_at == slot.end_at);
            if let Some(existing) = existing {
                if slot.capacity < existing.taken {
                    return Err(MedmisError::CapacityConflict(format!(
                        "slot at {} has {} bookings, new capacity {}",
                        format_hhmm(existing.start_at),
                        existing.taken,
                        slot.capacity
                    )));
                }
                slot.id = existing.id;
                slot.taken = existing.taken;
            } else {
                slot.taken = 0;
            }
            slot.room_id = room_id;
            slot.date = date;
            merged.push(slot);
        }

        // 带预约的号源不允许在新网格里消失
        for old in &day.slots {
            if old.taken > 0 && !merged.iter().any(|s| s.id == old.id) {
                return Err(MedmisError::BookingConflict(format!(
                    "slot at {} has {} bookings and is absent from the new grid",
                    format_hhmm(old.start_at),
                    old.taken
                )));
            }
        }

        let removed: Vec<Uuid> = day
            .slots
            .iter()
            .filter(|old| !merged.iter().any(|s| s.id == old.id))
            .map(|s| s.id)
            .collect();
        self.index_remove(&removed);
        for slot in &merged {
            self.index_insert(slot.id, (room_id, date));
        }

        day.slots = merged;
        tracing::info!(room_id = %room_id, %date, slots = day.slots.len(), "Resized slot grid");
        Ok(day.sorted_slots())
    }

    /// 添加停诊窗口
    ///
    /// 与窗口相交且已有预约的号源导致拒绝；无预约的相交号源从
    /// 网格中移除。返回被移除的号源 id。
    pub fn add_blackout(
        &self,
        room_id: Uuid,
        date: NaiveDate,
        blackout: Blackout,
    ) -> Result<Vec<Uuid>> {
        if blackout.from >= blackout.to {
            return Err(MedmisError::Validation(format!(
                "blackout range {}..{} is empty",
                format_hhmm(blackout.from),
                format_hhmm(blackout.to)
            )));
        }

        let day = self.day_handle(room_id, date);
        let mut day = day.lock().expect("room day lock poisoned");

        if let Some(booked) = day
            .slots
            .iter()
            .find(|s| s.taken > 0 && s.intersects(blackout.from, blackout.to))
        {
            return Err(MedmisError::BookingConflict(format!(
                "slot at {} has {} bookings inside blackout {}..{}",
                format_hhmm(booked.start_at),
                booked.taken,
                format_hhmm(blackout.from),
                format_hhmm(blackout.to)
            )));
        }

        let removed: Vec<Uuid> = day
            .slots
            .iter()
            .filter(|s| s.intersects(blackout.from, blackout.to))
            .map(|s| s.id)
            .collect();
        day.slots.retain(|s| !removed.contains(&s.id));
        self.index_remove(&removed);

        tracing::info!(
            room_id = %room_id,
            %date,
            from = %format_hhmm(blackout.from),
            to = %format_hhmm(blackout.to),
            removed = removed.len(),
            "Added blackout window"
        );
        day.blackouts.push(blackout);
        Ok(removed)
    }

    /// 移除停诊窗口并恢复释放出的区间
    ///
    /// 候选号源来自检查室的标准工作时段定义，只安装不与剩余停诊
    /// 窗口和现存号源相交的部分，全部以 taken=0 恢复，绝不复活
    /// 已被取消的预约。
    pub fn remove_blackout(
        &self,
        room_id: Uuid,
        date: NaiveDate,
        blackout_id: Uuid,
        candidates: Vec<Slot>,
    ) -> Result<Vec<Slot>> {
        let day = self.day_handle(room_id, date);
        let mut day = day.lock().expect("room day lock poisoned");

        let before = day.blackouts.len();
        day.blackouts.retain(|b| b.id != blackout_id);
        if day.blackouts.len() == before {
            return Err(MedmisError::NotFound(format!("blackout {}", blackout_id)));
        }

        let mut restored = Vec::new();
        for mut slot in candidates {
            let clashes = day
                .slots
                .iter()
                .any(|s| s.intersects(slot.start_at, slot.end_at))
                || day
                    .blackouts
                    .iter()
                    .any(|b| slot.intersects(b.from, b.to));
            if clashes {
                continue;
            }
            slot.taken = 0;
            self.index_insert(slot.id, (room_id, date));
            day.slots.push(slot.clone());
            restored.push(slot);
        }
        tracing::info!(
            room_id = %room_id,
            %date,
            restored = restored.len(),
            "Removed blackout window"
        );
        Ok(restored)
    }

    /// 按 id 查询单个号源
    pub fn find_slot(&self, slot_id: Uuid) -> Result<Slot> {
        let (room_id, date) = self.locate(slot_id)?;
        let day = self.day_handle(room_id, date);
        let day = day.lock().expect("room day lock poisoned");
        day.slots
            .iter()
            .find(|s| s.id == slot_id)
            .cloned()
            .ok_or_else(|| MedmisError::NotFound(format!("slot {}", slot_id)))
    }

    /// 某日全部号源的一致性快照，按起始时间排序
    pub fn snapshot_day(&self, room_id: Uuid, date: NaiveDate) -> Vec<Slot> {
        match self.existing_day(room_id, date) {
            Some(day) => day.lock().expect("room day lock poisoned").sorted_slots(),
            None => Vec::new(),
        }
    }

    /// 某日全部号源的已预约总数
    pub fn room_day_taken(&self, room_id: Uuid, date: NaiveDate) -> u32 {
        self.snapshot_day(room_id, date)
            .iter()
            .map(|s| s.taken)
            .sum()
    }

    /// 某日仍有余量的号源
    pub fn open_slots(&self, room_id: Uuid, date: NaiveDate) -> Vec<Slot> {
        self.snapshot_day(room_id, date)
            .into_iter()
            .filter(|s| !s.is_full())
            .collect()
    }

    /// 某日当前生效的停诊窗口
    pub fn blackouts(&self, room_id: Uuid, date: NaiveDate) -> Vec<Blackout> {
        match self.existing_day(room_id, date) {
            Some(day) => day
                .lock()
                .expect("room day lock poisoned")
                .blackouts
                .clone(),
            None => Vec::new(),
        }
    }
}
