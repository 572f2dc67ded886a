//! 排班日历
//!
//! 从检查室的每周工作时段和小时容量推导某一天的标准号源网格。
//! 并行容量建模为多个容量为 1 的平行号源单元：每小时切分为
//! capacity_per_hour 个等宽单元，整个工作时段内号源容量之和等于
//! capacity_per_hour × 工作小时数。

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use medmis_core::{Room, Slot};

/// 号源单元宽度（分钟）
///
/// 60 整除 capacity_per_hour 时恰好铺满每小时，否则向下取整，
/// 末尾不足一个单元宽度的区间不生成号源。
pub fn slot_width_minutes(capacity_per_hour: u32) -> i64 {
    (60 / capacity_per_hour.max(1)).max(1) as i64
}

/// 生成检查室某一天的标准号源（尚未发生任何预约）
///
/// 该日无匹配工作时段或检查室不可预约时返回空集，不报错。
pub fn quanta_for_day(room: &Room, date: NaiveDate) -> Vec<Slot> {
    if !room.is_bookable() {
        return Vec::new();
    }
    let width = Duration::minutes(slot_width_minutes(room.capacity_per_hour));
    let mut quanta = Vec::new();
    for work_hour in room.work_hours_for(date) {
        let mut cursor = work_hour.start;
        loop {
            let end = cursor + width;
            if end > work_hour.end || end <= cursor {
                break;
            }
            quanta.push(Slot {
                id: Uuid::new_v4(),
                room_id: room.id,
                date,
                start_at: cursor,
                end_at: end,
                capacity: 1,
                taken: 0,
            });
            cursor = end;
        }
    }
    quanta
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc, Weekday};
    use medmis_core::{Modality, RoomStatus, WorkHour};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn room(capacity_per_hour: u32, status: RoomStatus) -> Room {
        Room {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            name: "MRI室1".to_string(),
            code: "MRI1".to_string(),
            modality: Modality::Mri,
            capacity_per_hour,
            // 2024-07-01 是周一
            work_hours: vec![WorkHour {
                weekday: Weekday::Mon,
                start: t(8, 0),
                end: t(12, 0),
            }],
            status,
            created_at: Utc::now(),
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    #[test]
    fn test_capacity_sum_equals_hourly_capacity_times_hours() {
        let room = room(2, RoomStatus::Up);
        let quanta = quanta_for_day(&room, monday());
        // 4 小时 × 每小时 2 个容量为 1 的单元
        assert_eq!(quanta.len(), 8);
        let total: u32 = quanta.iter().map(|s| s.capacity).sum();
        assert_eq!(total, 2 * 4);
        assert!(quanta.iter().all(|s| s.capacity == 1 && s.taken == 0));
    }

    #[test]
    fn test_quanta_are_consecutive_and_bounded() {
        let room = room(4, RoomStatus::Up);
        let quanta = quanta_for_day(&room, monday());
        assert_eq!(quanta[0].start_at, t(8, 0));
        for pair in quanta.windows(2) {
            assert_eq!(pair[0].end_at, pair[1].start_at);
        }
        assert!(quanta.last().unwrap().end_at <= t(12, 0));
    }

    #[test]
    fn test_split_shift_covers_both_ranges() {
        let mut room = room(2, RoomStatus::Up);
        // 上下午两段，中午休息
        room.work_hours = vec![
            WorkHour { weekday: Weekday::Mon, start: t(14, 0), end: t(16, 0) },
            WorkHour { weekday: Weekday::Mon, start: t(8, 0), end: t(10, 0) },
        ];
        let quanta = quanta_for_day(&room, monday());
        assert_eq!(quanta.len(), 8);
        assert_eq!(quanta[0].start_at, t(8, 0));
        assert_eq!(quanta[4].start_at, t(14, 0));
        // 休息区间不生成号源
        assert!(quanta.iter().all(|s| s.end_at <= t(10, 0) || s.start_at >= t(14, 0)));
    }

    #[test]
    fn test_no_work_hour_yields_empty() {
        let room = room(2, RoomStatus::Up);
        // 周二无工作时段
        let tuesday = NaiveDate::from_ymd_opt(2024, 7, 2).unwrap();
        assert!(quanta_for_day(&room, tuesday).is_empty());
    }

    #[test]
    fn test_down_room_yields_empty() {
        let room = room(2, RoomStatus::Down);
        assert!(quanta_for_day(&room, monday()).is_empty());
    }

    #[test]
    fn test_slot_width() {
        assert_eq!(slot_width_minutes(1), 60);
        assert_eq!(slot_width_minutes(4), 15);
        // 不整除时向下取整
        assert_eq!(slot_width_minutes(7), 8);
    }
}
