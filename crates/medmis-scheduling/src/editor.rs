//! 排班编辑器
//!
//! 检查室排班的受控变更入口：工作时段、号源网格、停诊窗口与运行
//! 状态都从这里改，变更成功后发布领域事件。号源层面的不变量由
//! `SlotStore` 把守，编辑器负责工作时段校验和事件传播。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Weekday};
use uuid::Uuid;

use medmis_core::{
    format_hhmm, has_internal_overlap, Blackout, MedmisError, Repository, Result, Room,
    RoomStatus, Slot, WorkHour,
};
use medmis_integration::{DomainEvent, EventBus};

use crate::calendar::quanta_for_day;
use crate::slot_store::SlotStore;

/// 排班编辑器
pub struct ScheduleEditor {
    rooms: Arc<dyn Repository<Room>>,
    store: Arc<SlotStore>,
    bus: EventBus,
}

impl ScheduleEditor {
    pub fn new(rooms: Arc<dyn Repository<Room>>, store: Arc<SlotStore>, bus: EventBus) -> Self {
        Self { rooms, store, bus }
    }

    /// 设置检查室每周工作时段
    ///
    /// 同一 weekday 内时段两两不重叠，否则整体拒绝。
    pub fn set_work_hours(&self, room_id: Uuid, hours: Vec<WorkHour>) -> Result<Room> {
        let mut by_weekday: HashMap<Weekday, Vec<(NaiveTime, NaiveTime)>> = HashMap::new();
        for wh in &hours {
            if wh.start >= wh.end {
                return Err(MedmisError::Validation(format!(
                    "work hour {}..{} is empty",
                    format_hhmm(wh.start),
                    format_hhmm(wh.end)
                )));
            }
            by_weekday.entry(wh.weekday).or_default().push((wh.start, wh.end));
        }
        for (weekday, ranges) in &by_weekday {
            if has_internal_overlap(ranges) {
                return Err(MedmisError::Overlap(format!(
                    "work hours overlap on {:?}",
                    weekday
                )));
            }
        }

        let room = self.rooms.update(room_id, &mut |room| {
            room.work_hours = hours.clone();
            Ok(())
        })?;
        tracing::info!(room_id = %room_id, ranges = room.work_hours.len(), "Updated work hours");
        self.bus.publish(DomainEvent::RoomUpdated { room: room.clone() });
        Ok(room)
    }

    /// 按标准工作时段生成并安装某日的号源网格，幂等
    pub fn ensure_day(&self, room_id: Uuid, date: NaiveDate) -> Result<Vec<Slot>> {
        let room = self.rooms.get(room_id)?;
        let quanta = quanta_for_day(&room, date);
        let installed = self.store.ensure_day(room_id, date, quanta)?;
        if !installed.is_empty() {
            self.bus.publish(DomainEvent::ScheduleChanged { room_id, date });
        }
        Ok(self.store.snapshot_day(room_id, date))
    }

    /// 用显式给定的网格替换某日号源
    pub fn apply_slot_grid(
        &self,
        room_id: Uuid,
        date: NaiveDate,
        slots: Vec<Slot>,
    ) -> Result<Vec<Slot>> {
        self.rooms.get(room_id)?;
        let resized = self.store.resize(room_id, date, slots)?;
        self.bus.publish(DomainEvent::ScheduleChanged { room_id, date });
        Ok(resized)
    }

    /// 添加停诊窗口
    ///
    /// 窗口内存在已预约号源时拒绝，由调用方先行处理这些预约。
    pub fn add_blackout(
        &self,
        room_id: Uuid,
        date: NaiveDate,
        from: NaiveTime,
        to: NaiveTime,
        reason: Option<String>,
    ) -> Result<Blackout> {
        self.rooms.get(room_id)?;
        let blackout = Blackout {
            id: Uuid::new_v4(),
            from,
            to,
            reason,
        };
        self.store.add_blackout(room_id, date, blackout.clone())?;
        self.bus.publish(DomainEvent::ScheduleChanged { room_id, date });
        Ok(blackout)
    }

    /// 移除停诊窗口，按标准工作时段恢复释放出的区间
    pub fn remove_blackout(
        &self,
        room_id: Uuid,
        date: NaiveDate,
        blackout_id: Uuid,
    ) -> Result<Vec<Slot>> {
        let room = self.rooms.get(room_id)?;
        let candidates = quanta_for_day(&room, date);
        let restored = self
            .store
            .remove_blackout(room_id, date, blackout_id, candidates)?;
        self.bus.publish(DomainEvent::ScheduleChanged { room_id, date });
        Ok(restored)
    }

    /// 变更检查室运行状态（软删除用停用代替删除）
    pub fn set_room_status(&self, room_id: Uuid, status: RoomStatus) -> Result<Room> {
        let room = self.rooms.update(room_id, &mut |room| {
            room.status = status;
            Ok(())
        })?;
        tracing::info!(room_id = %room_id, ?status, "Changed room status");
        self.bus.publish(DomainEvent::RoomUpdated { room: room.clone() });
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use medmis_core::{InMemoryRepository, Modality};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn setup() -> (ScheduleEditor, Uuid) {
        let rooms: Arc<dyn Repository<Room>> = Arc::new(InMemoryRepository::new());
        let room = Room {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            name: "CT室1".to_string(),
            code: "CT1".to_string(),
            modality: Modality::Ct,
            capacity_per_hour: 2,
            work_hours: vec![WorkHour {
                weekday: Weekday::Mon,
                start: t(8, 0),
                end: t(10, 0),
            }],
            status: RoomStatus::Up,
            created_at: Utc::now(),
        };
        let room_id = room.id;
        rooms.insert(room).unwrap();
        let editor = ScheduleEditor::new(rooms, Arc::new(SlotStore::new()), EventBus::default());
        (editor, room_id)
    }

    #[test]
    fn test_set_work_hours_rejects_overlap() {
        let (editor, room_id) = setup();
        let overlapping = vec![
            WorkHour { weekday: Weekday::Mon, start: t(8, 0), end: t(12, 0) },
            WorkHour { weekday: Weekday::Mon, start: t(11, 0), end: t(14, 0) },
        ];
        assert!(matches!(
            editor.set_work_hours(room_id, overlapping).unwrap_err(),
            MedmisError::Overlap(_)
        ));
    }

    #[test]
    fn test_work_hours_may_overlap_across_weekdays() {
        let (editor, room_id) = setup();
        let hours = vec![
            WorkHour { weekday: Weekday::Mon, start: t(8, 0), end: t(12, 0) },
            WorkHour { weekday: Weekday::Tue, start: t(8, 0), end: t(12, 0) },
        ];
        let room = editor.set_work_hours(room_id, hours).unwrap();
        assert_eq!(room.work_hours.len(), 2);
    }

    #[test]
    fn test_ensure_day_generates_grid() {
        let (editor, room_id) = setup();
        let slots = editor.ensure_day(room_id, monday()).unwrap();
        // 2 小时 × 每小时 2 个单元
        assert_eq!(slots.len(), 4);
        // 重复调用不翻倍
        let again = editor.ensure_day(room_id, monday()).unwrap();
        assert_eq!(again.len(), 4);
    }

    #[test]
    fn test_blackout_roundtrip_restores_free_capacity() {
        let (editor, room_id) = setup();
        editor.ensure_day(room_id, monday()).unwrap();

        let blackout = editor
            .add_blackout(room_id, monday(), t(8, 0), t(9, 0), Some("维护".into()))
            .unwrap();
        let remaining = editor.ensure_day(room_id, monday()).unwrap();
        assert_eq!(remaining.len(), 2);

        let restored = editor.remove_blackout(room_id, monday(), blackout.id).unwrap();
        assert_eq!(restored.len(), 2);
        assert!(restored.iter().all(|s| s.taken == 0));
    }

    #[test]
    fn test_unknown_room_is_not_found() {
        let (editor, _) = setup();
        assert!(matches!(
            editor.ensure_day(Uuid::new_v4(), monday()).unwrap_err(),
            MedmisError::NotFound(_)
        ));
    }
}
