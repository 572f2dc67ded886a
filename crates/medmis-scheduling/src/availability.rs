//! 可见性过滤
//!
//! 在已按余量过滤的号源之上应用角色可见性策略。纯函数，给定相同
//! 的号源快照、策略与时刻，结果完全确定，两个并发查询方看到一致
//! 的列表。

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

use medmis_core::{ClinicPolicies, Slot, UserRole};

/// 按角色收窄可预约号源
///
/// 规则：
/// 1. 转诊医生与患者看不到早于 now + ref_slots_today_min_offset_min
///    的号源。
/// 2. 转诊医生对"今天"的剩余号源只看到策略配置的百分比，取按起始
///    时间最早的 ceil(n × pct / 100) 个；未来日期不受限。
/// 3. 其他角色（如前台）只剔除起始时刻已过的号源。
///
/// 输出按 (日期, 起始时间) 升序。
pub fn visible_slots(
    slots: &[Slot],
    role: UserRole,
    policies: &ClinicPolicies,
    now: DateTime<Utc>,
) -> Vec<Slot> {
    let mut candidates: Vec<Slot> = slots.iter().filter(|s| !s.is_full()).cloned().collect();
    candidates.sort_by_key(|s| (s.date, s.start_at));

    match role {
        UserRole::Referrer | UserRole::Patient => {
            let horizon = now + Duration::minutes(policies.ref_slots_today_min_offset_min);
            candidates.retain(|s| s.start_datetime() >= horizon);

            if role == UserRole::Referrer {
                let today = now.date_naive();
                let todays: Vec<usize> = candidates
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.date == today)
                    .map(|(i, _)| i)
                    .collect();
                let visible = ceil_pct(todays.len(), policies.ref_slots_today_visibility_pct);
                // 同日只保留最早的 visible 个，排序后即前缀
                let hidden: Vec<usize> = todays.into_iter().skip(visible).collect();
                let mut idx = 0usize;
                candidates.retain(|_| {
                    let keep = !hidden.contains(&idx);
                    idx += 1;
                    keep
                });
            }
            candidates
        }
        _ => {
            candidates.retain(|s| s.start_datetime() >= now);
            candidates
        }
    }
}

fn ceil_pct(count: usize, pct: u32) -> usize {
    (count * pct as usize + 99) / 100
}

/// 某一整点小时的容量概况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityQuantum {
    pub hour: NaiveTime,
    pub capacity: u32,
    pub booked: u32,
    pub free: u32,
}

impl AvailabilityQuantum {
    /// 负载百分比
    pub fn load_pct(&self) -> u32 {
        if self.capacity == 0 {
            return 0;
        }
        self.booked * 100 / self.capacity
    }
}

/// 按整点小时聚合容量概况
///
/// 用于日历视图的热力展示，桶键为号源起始时间所在整点。
pub fn availability_quanta(slots: &[Slot]) -> Vec<AvailabilityQuantum> {
    let mut buckets: BTreeMap<NaiveTime, (u32, u32)> = BTreeMap::new();
    for slot in slots {
        let hour = NaiveTime::from_hms_opt(slot.start_at.hour(), 0, 0)
            .unwrap_or(slot.start_at);
        let entry = buckets.entry(hour).or_insert((0, 0));
        entry.0 += slot.capacity;
        entry.1 += slot.taken;
    }
    buckets
        .into_iter()
        .map(|(hour, (capacity, booked))| AvailabilityQuantum {
            hour,
            capacity,
            booked,
            free: capacity - booked,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use uuid::Uuid;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn slot(date: NaiveDate, start: NaiveTime, taken: u32) -> Slot {
        Slot {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            date,
            start_at: start,
            end_at: start + Duration::minutes(30),
            capacity: 1,
            taken,
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    #[test]
    fn test_lead_time_excludes_near_slots() {
        let policies = ClinicPolicies::default(); // 提前量 60 分钟
        let slots = vec![
            slot(today(), t(12, 30), 0), // now + 30
            slot(today(), t(13, 30), 0), // now + 90
        ];
        let visible = visible_slots(&slots, UserRole::Referrer, &policies, noon());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].start_at, t(13, 30));
    }

    #[test]
    fn test_referrer_sees_half_of_today() {
        let policies = ClinicPolicies::default(); // 当日可见 50%
        let slots = vec![
            slot(today(), t(14, 0), 0),
            slot(today(), t(15, 0), 0),
            slot(today(), t(16, 0), 0),
            slot(today(), t(17, 0), 0),
        ];
        let visible = visible_slots(&slots, UserRole::Referrer, &policies, noon());
        // 最早优先的前 ceil(4 × 50 / 100) = 2 个
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].start_at, t(14, 0));
        assert_eq!(visible[1].start_at, t(15, 0));

        // 重复调用结果稳定
        let again = visible_slots(&slots, UserRole::Referrer, &policies, noon());
        assert_eq!(
            visible.iter().map(|s| s.id).collect::<Vec<_>>(),
            again.iter().map(|s| s.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_future_days_not_percentage_limited() {
        let policies = ClinicPolicies::default();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 7, 2).unwrap();
        let slots = vec![
            slot(tomorrow, t(8, 0), 0),
            slot(tomorrow, t(9, 0), 0),
            slot(tomorrow, t(10, 0), 0),
            slot(tomorrow, t(11, 0), 0),
        ];
        let visible = visible_slots(&slots, UserRole::Referrer, &policies, noon());
        assert_eq!(visible.len(), 4);
    }

    #[test]
    fn test_patient_gets_lead_time_but_no_percentage() {
        let policies = ClinicPolicies::default();
        let slots = vec![
            slot(today(), t(12, 30), 0),
            slot(today(), t(14, 0), 0),
            slot(today(), t(15, 0), 0),
        ];
        let visible = visible_slots(&slots, UserRole::Patient, &policies, noon());
        assert_eq!(visible.len(), 2);
    }

    #[test]
    fn test_reception_only_drops_past_slots() {
        let policies = ClinicPolicies::default();
        let slots = vec![
            slot(today(), t(9, 0), 0),  // 已过
            slot(today(), t(12, 15), 0), // 提前量内但未过
        ];
        let visible = visible_slots(&slots, UserRole::Reception, &policies, noon());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].start_at, t(12, 15));
    }

    #[test]
    fn test_full_slots_never_visible() {
        let policies = ClinicPolicies::default();
        let slots = vec![slot(today(), t(15, 0), 1)];
        assert!(visible_slots(&slots, UserRole::Reception, &policies, noon()).is_empty());
    }

    #[test]
    fn test_output_sorted_by_date_then_time() {
        let policies = ClinicPolicies::default();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 7, 2).unwrap();
        let slots = vec![
            slot(tomorrow, t(8, 0), 0),
            slot(today(), t(15, 0), 0),
            slot(today(), t(14, 0), 0),
        ];
        let visible = visible_slots(&slots, UserRole::Reception, &policies, noon());
        let order: Vec<_> = visible.iter().map(|s| (s.date, s.start_at)).collect();
        assert_eq!(
            order,
            vec![(today(), t(14, 0)), (today(), t(15, 0)), (tomorrow, t(8, 0))]
        );
    }

    #[test]
    fn test_hourly_aggregation() {
        let slots = vec![
            slot(today(), t(8, 0), 0),
            slot(today(), t(8, 30), 1),
            slot(today(), t(9, 0), 0),
        ];
        let quanta = availability_quanta(&slots);
        assert_eq!(quanta.len(), 2);
        assert_eq!(
            quanta[0],
            AvailabilityQuantum { hour: t(8, 0), capacity: 2, booked: 1, free: 1 }
        );
        assert_eq!(quanta[0].load_pct(), 50);
        assert_eq!(
            quanta[1],
            AvailabilityQuantum { hour: t(9, 0), capacity: 1, booked: 0, free: 1 }
        );
    }
}
