//! 队列引擎
//!
//! 患者旅程的事务入口：预约占用号源并创建队列项，开检、上传、
//! 出报告、完成、取消各走状态机校验。每个队列项的转换按 id 持锁
//! 串行化，校验全部通过后才落写，失败不留部分效果。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use uuid::Uuid;

use medmis_core::{
    Clock, DicomCollection, FileMetadata, MedmisError, PatientHint, PatientRef, Priority,
    QueueItem, QueueStatus, Referral, ReferralStatus, Repository, Result, Room, Study,
    StudyStatus,
};
use medmis_integration::{DomainEvent, EventBus};
use medmis_scheduling::SlotStore;

use crate::state_machine::{QueueEvent, QueueStateMachine, StudyEvent, StudyStateMachine};

/// 预约请求
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub patient: PatientRef,
    pub clinic_id: Uuid,
    pub slot_id: Uuid,
    pub priority: Priority,
    pub complaints: String,
    pub referral_id: Option<Uuid>,
}

/// 转诊单创建请求
#[derive(Debug, Clone)]
pub struct ReferralRequest {
    pub referrer_id: Uuid,
    pub clinic_id: Uuid,
    pub slot_id: Uuid,
    pub patient_hint: PatientHint,
}

/// 队列引擎
pub struct QueueEngine {
    items: Arc<dyn Repository<QueueItem>>,
    studies: Arc<dyn Repository<Study>>,
    referrals: Arc<dyn Repository<Referral>>,
    rooms: Arc<dyn Repository<Room>>,
    store: Arc<SlotStore>,
    queue_sm: QueueStateMachine,
    study_sm: StudyStateMachine,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    item_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl QueueEngine {
    pub fn new(
        items: Arc<dyn Repository<QueueItem>>,
        studies: Arc<dyn Repository<Study>>,
        referrals: Arc<dyn Repository<Referral>>,
        rooms: Arc<dyn Repository<Room>>,
        store: Arc<SlotStore>,
        clock: Arc<dyn Clock>,
        bus: EventBus,
    ) -> Self {
        Self {
            items,
            studies,
            referrals,
            rooms,
            store,
            queue_sm: QueueStateMachine::new(),
            study_sm: StudyStateMachine::new(),
            clock,
            bus,
            item_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 同一队列项的转换串行化
    fn item_lock(&self, item_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.item_locks.lock().expect("queue engine lock poisoned");
        Arc::clone(locks.entry(item_id).or_default())
    }

    /// 预约号源并创建队列项
    ///
    /// 先原子占用号源，队列项创建失败时补偿释放，两者要么都成功
    /// 要么都不发生。
    pub fn book_slot(&self, request: BookingRequest) -> Result<QueueItem> {
        if let Some(referral_id) = request.referral_id {
            let referral = self.referrals.get(referral_id)?;
            if referral.status != ReferralStatus::Yellow {
                return Err(MedmisError::Conflict(format!(
                    "referral {} is already {:?}",
                    referral_id, referral.status
                )));
            }
        }

        let slot = self.store.reserve(request.slot_id)?;
        let item = QueueItem {
            id: Uuid::new_v4(),
            patient: request.patient,
            clinic_id: request.clinic_id,
            room_id: slot.room_id,
            slot_id: slot.id,
            date: slot.date,
            start_at: slot.start_at,
            priority: request.priority,
            status: QueueStatus::Queued,
            complaints: request.complaints,
            referral_id: request.referral_id,
            radiologist_id: None,
            assigned_by: None,
            study_id: None,
            created_at: self.clock.now(),
        };

        if let Err(e) = self.items.insert(item.clone()) {
            // 补偿释放，保持号源计数一致
            let _ = self.store.release(slot.id);
            return Err(e);
        }

        tracing::info!(
            item_id = %item.id,
            slot_id = %slot.id,
            priority = ?item.priority,
            "Booked slot and queued patient"
        );
        self.bus.publish(DomainEvent::SlotReserved { slot });
        self.bus.publish(DomainEvent::QueueCreated { item: item.clone() });
        Ok(item)
    }

    /// 操作员开检，创建检查记录
    pub fn start_study(&self, item_id: Uuid, operator_id: Uuid) -> Result<Study> {
        let lock = self.item_lock(item_id);
        let _guard = lock.lock().expect("queue item lock poisoned");

        let item = self.items.get(item_id)?;
        let next = self.queue_sm.transition(item.status, QueueEvent::StudyStarted)?;
        let room = self.rooms.get(item.room_id)?;

        let study = Study {
            id: Uuid::new_v4(),
            queue_item_id: item.id,
            clinic_id: item.clinic_id,
            room_id: item.room_id,
            slot_id: item.slot_id,
            modality: room.modality,
            operator_id,
            radiologist_id: item.radiologist_id,
            started_at: self.clock.now(),
            finished_at: None,
            dicom: DicomCollection::default(),
            docs: Vec::new(),
            status: StudyStatus::InProgress,
        };
        self.studies.insert(study.clone())?;

        let from = item.status;
        let updated = self.items.update(item_id, &mut |item| {
            item.status = next;
            item.study_id = Some(study.id);
            Ok(())
        })?;

        tracing::info!(item_id = %item_id, study_id = %study.id, "Study started");
        self.bus.publish(DomainEvent::StudyStarted { study: study.clone() });
        self.bus.publish(DomainEvent::QueueTransitioned { item: updated, from });
        Ok(study)
    }

    /// 向检查记录追加文件，队列项保持检查中
    ///
    /// 与同一队列项的其他转换持同一把锁，已关闭的检查拒绝追加。
    pub fn upload_to_study(&self, study_id: Uuid, file: FileMetadata) -> Result<Study> {
        let study = self.studies.get(study_id)?;
        let lock = self.item_lock(study.queue_item_id);
        let _guard = lock.lock().expect("queue item lock poisoned");

        // 状态机校验和落写在同一次 update 内完成
        let updated = self.studies.update(study_id, &mut |study| {
            study.status = self.study_sm.transition(study.status, StudyEvent::FileUploaded)?;
            if file.is_dicom() {
                study.dicom.total_size += file.size;
                study.dicom.objects.push(file.clone());
            } else {
                study.docs.push(file.clone());
            }
            Ok(())
        })?;

        tracing::debug!(study_id = %study_id, file = %file.name, "File attached to study");
        self.bus.publish(DomainEvent::StudyUploaded { study: updated.clone() });
        Ok(updated)
    }

    /// 操作员结束检查，队列项进入已出描述
    ///
    /// 关闭检查记录；挂着黄色转诊单的队列项同时把转诊单翻绿，
    /// 两个写入要么都发生要么都不发生。
    pub fn finish_study(&self, item_id: Uuid) -> Result<QueueItem> {
        let lock = self.item_lock(item_id);
        let _guard = lock.lock().expect("queue item lock poisoned");

        let item = self.items.get(item_id)?;
        let next = self.queue_sm.transition(item.status, QueueEvent::StudyFinished)?;
        let study_id = item
            .study_id
            .ok_or_else(|| MedmisError::Validation(format!("item {} has no study", item_id)))?;
        let study = self.studies.get(study_id)?;
        self.study_sm.transition(study.status, StudyEvent::Finished)?;

        // 全部校验通过后才开始落写
        let referral = match item.referral_id {
            Some(referral_id) => Some(self.referrals.get(referral_id)?),
            None => None,
        };

        let now = self.clock.now();
        let closed = self.studies.update(study_id, &mut |study| {
            study.status = StudyStatus::Finished;
            study.finished_at = Some(now);
            Ok(())
        })?;
        let from = item.status;
        let updated = self.items.update(item_id, &mut |item| {
            item.status = next;
            Ok(())
        })?;

        if let Some(referral) = referral {
            if referral.status == ReferralStatus::Yellow {
                let completed = self.referrals.update(referral.id, &mut |referral| {
                    referral.status = ReferralStatus::Green;
                    referral.updated_at = now;
                    Ok(())
                })?;
                self.bus
                    .publish(DomainEvent::ReferralCompleted { referral: completed });
            }
        }

        tracing::info!(item_id = %item_id, study_id = %study_id, "Study finished, report described");
        self.bus.publish(DomainEvent::StudyFinished { study: closed });
        self.bus.publish(DomainEvent::QueueTransitioned { item: updated.clone(), from });
        Ok(updated)
    }

    /// 确认完成，终态
    pub fn mark_done(&self, item_id: Uuid) -> Result<QueueItem> {
        self.apply_transition(item_id, QueueEvent::MarkedDone)
    }

    /// 标记爽约，仅对排队中的项有效
    pub fn mark_no_show(&self, item_id: Uuid) -> Result<QueueItem> {
        self.apply_transition(item_id, QueueEvent::MarkedNoShow)
    }

    /// 取消队列项并释放号源
    pub fn cancel(&self, item_id: Uuid) -> Result<QueueItem> {
        let lock = self.item_lock(item_id);
        let _guard = lock.lock().expect("queue item lock poisoned");

        let item = self.items.get(item_id)?;
        let next = self.queue_sm.transition(item.status, QueueEvent::Cancelled)?;

        let from = item.status;
        let updated = self.items.update(item_id, &mut |item| {
            item.status = next;
            Ok(())
        })?;
        let slot = self.store.release(item.slot_id)?;

        tracing::info!(item_id = %item_id, slot_id = %item.slot_id, "Queue item cancelled");
        self.bus.publish(DomainEvent::SlotReleased { slot });
        self.bus.publish(DomainEvent::QueueTransitioned { item: updated.clone(), from });
        Ok(updated)
    }

    fn apply_transition(&self, item_id: Uuid, event: QueueEvent) -> Result<QueueItem> {
        let lock = self.item_lock(item_id);
        let _guard = lock.lock().expect("queue item lock poisoned");

        let item = self.items.get(item_id)?;
        let next = self.queue_sm.transition(item.status, event)?;

        let from = item.status;
        let updated = self.items.update(item_id, &mut |item| {
            item.status = next;
            Ok(())
        })?;
        tracing::info!(item_id = %item_id, from = ?from, to = ?next, "Queue item transitioned");
        self.bus.publish(DomainEvent::QueueTransitioned { item: updated.clone(), from });
        Ok(updated)
    }

    /// 优先级升一级，只升不降
    pub fn escalate(&self, item_id: Uuid) -> Result<QueueItem> {
        let lock = self.item_lock(item_id);
        let _guard = lock.lock().expect("queue item lock poisoned");

        let item = self.items.get(item_id)?;
        if item.status.is_terminal() {
            return Err(MedmisError::InvalidTransition {
                from: format!("{:?}", item.status),
                event: "PriorityEscalated".to_string(),
            });
        }
        let updated = self.items.update(item_id, &mut |item| {
            item.priority = item.priority.escalated();
            Ok(())
        })?;
        tracing::info!(item_id = %item_id, priority = ?updated.priority, "Priority escalated");
        self.bus
            .publish(DomainEvent::PriorityEscalated { item: updated.clone() });
        Ok(updated)
    }

    /// 管理端直接改写优先级，无方向限制
    pub fn set_priority(&self, item_id: Uuid, priority: Priority) -> Result<QueueItem> {
        let lock = self.item_lock(item_id);
        let _guard = lock.lock().expect("queue item lock poisoned");

        let updated = self.items.update(item_id, &mut |item| {
            item.priority = priority;
            Ok(())
        })?;
        self.bus
            .publish(DomainEvent::PriorityChanged { item: updated.clone() });
        Ok(updated)
    }

    /// 指派或改派放射科医生，终态后不可指派
    ///
    /// 改派是覆盖，不是排队。
    pub fn assign_radiologist(
        &self,
        item_id: Uuid,
        radiologist_id: Uuid,
        assigned_by: Uuid,
    ) -> Result<QueueItem> {
        let lock = self.item_lock(item_id);
        let _guard = lock.lock().expect("queue item lock poisoned");

        let item = self.items.get(item_id)?;
        if item.status.is_terminal() {
            return Err(MedmisError::InvalidTransition {
                from: format!("{:?}", item.status),
                event: "RadiologistAssigned".to_string(),
            });
        }

        let updated = self.items.update(item_id, &mut |item| {
            item.radiologist_id = Some(radiologist_id);
            item.assigned_by = Some(assigned_by);
            Ok(())
        })?;
        if let Some(study_id) = updated.study_id {
            self.studies.update(study_id, &mut |study| {
                study.radiologist_id = Some(radiologist_id);
                Ok(())
            })?;
        }
        tracing::info!(item_id = %item_id, radiologist_id = %radiologist_id, "Radiologist assigned");
        self.bus
            .publish(DomainEvent::RadiologistAssigned { item: updated.clone() });
        Ok(updated)
    }

    /// 某诊所某日的队列，按起始时间排序
    pub fn queue_for_day(&self, clinic_id: Uuid, date: NaiveDate) -> Vec<QueueItem> {
        let mut items = self
            .items
            .select(&|item| item.clinic_id == clinic_id && item.date == date);
        items.sort_by_key(|item| item.start_at);
        items
    }

    /// 经理视角的工作队列：未终结的项按优先级降序、同级先到先处理
    pub fn manager_queue(&self, clinic_id: Uuid, date: NaiveDate) -> Vec<QueueItem> {
        let mut items = self.items.select(&|item| {
            item.clinic_id == clinic_id && item.date == date && !item.status.is_terminal()
        });
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        items
    }

    /// 放射科医生的待办列表
    pub fn radiology_inbox(&self, radiologist_id: Uuid) -> Vec<QueueItem> {
        let mut items = self.items.select(&|item| {
            item.radiologist_id == Some(radiologist_id) && !item.status.is_terminal()
        });
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        items
    }

    /// 转诊医生针对特定号源开出转诊单
    pub fn create_referral(&self, request: ReferralRequest) -> Result<Referral> {
        let slot = self.store.find_slot(request.slot_id)?;
        if slot.is_full() {
            return Err(MedmisError::SlotFull(format!("slot {}", slot.id)));
        }

        let id = Uuid::new_v4();
        let now = self.clock.now();
        let referral = Referral {
            id,
            referrer_id: request.referrer_id,
            clinic_id: request.clinic_id,
            room_id: slot.room_id,
            slot_id: slot.id,
            qr_code: format!("MEDMIS-REF-{}", id),
            short_code: id.simple().to_string()[..6].to_uppercase(),
            patient_hint: request.patient_hint,
            status: ReferralStatus::Yellow,
            created_at: now,
            updated_at: now,
        };
        self.referrals.insert(referral.clone())?;

        tracing::info!(referral_id = %referral.id, slot_id = %slot.id, "Referral created");
        self.bus
            .publish(DomainEvent::ReferralCreated { referral: referral.clone() });
        Ok(referral)
    }

    /// 作废转诊单，仅黄色可作废
    pub fn expire_referral(&self, referral_id: Uuid) -> Result<Referral> {
        let referral = self.referrals.get(referral_id)?;
        if referral.status != ReferralStatus::Yellow {
            return Err(MedmisError::Conflict(format!(
                "referral {} is already {:?}",
                referral_id, referral.status
            )));
        }
        let now = self.clock.now();
        let expired = self.referrals.update(referral_id, &mut |referral| {
            referral.status = ReferralStatus::Red;
            referral.updated_at = now;
            Ok(())
        })?;
        tracing::info!(referral_id = %referral_id, "Referral expired");
        self.bus
            .publish(DomainEvent::ReferralExpired { referral: expired.clone() });
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
    use medmis_core::{
        FixedClock, InMemoryRepository, Modality, RoomStatus, Slot, WorkHour,
    };

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    struct Fixture {
        engine: QueueEngine,
        store: Arc<SlotStore>,
        bus: EventBus,
        clinic_id: Uuid,
        slot_ids: Vec<Uuid>,
    }

    fn fixture() -> Fixture {
        let rooms: Arc<dyn Repository<Room>> = Arc::new(InMemoryRepository::new());
        let clinic_id = Uuid::new_v4();
        let room = Room {
            id: Uuid::new_v4(),
            clinic_id,
            name: "MRI室1".to_string(),
            code: "MRI1".to_string(),
            modality: Modality::Mri,
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

        let store = Arc::new(SlotStore::new());
        let quanta: Vec<Slot> = [t(8, 0), t(8, 30), t(9, 0)]
            .iter()
            .map(|start| Slot {
                id: Uuid::new_v4(),
                room_id,
                date: date(),
                start_at: *start,
                end_at: *start + chrono::Duration::minutes(30),
                capacity: 1,
                taken: 0,
            })
            .collect();
        let installed = store.ensure_day(room_id, date(), quanta).unwrap();
        let slot_ids = installed.iter().map(|s| s.id).collect();

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 7, 1, 7, 0, 0).unwrap(),
        ));
        let bus = EventBus::default();
        let engine = QueueEngine::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(InMemoryRepository::new()),
            Arc::new(InMemoryRepository::new()),
            rooms,
            Arc::clone(&store),
            clock,
            bus.clone(),
        );
        Fixture { engine, store, bus, clinic_id, slot_ids }
    }

    fn booking(fx: &Fixture, slot_id: Uuid, priority: Priority) -> BookingRequest {
        BookingRequest {
            patient: PatientRef {
                id: Uuid::new_v4(),
                masked_name: "张**".to_string(),
                age: Some(42),
            },
            clinic_id: fx.clinic_id,
            slot_id,
            priority,
            complaints: "головная боль".to_string(),
            referral_id: None,
        }
    }

    #[test]
    fn test_booking_reserves_slot() {
        let fx = fixture();
        let item = fx.engine.book_slot(booking(&fx, fx.slot_ids[0], Priority::Std)).unwrap();

        assert_eq!(item.status, QueueStatus::Queued);
        assert_eq!(fx.store.find_slot(fx.slot_ids[0]).unwrap().taken, 1);
        // 同号源第二次预约失败，计数不超容量
        let err = fx
            .engine
            .book_slot(booking(&fx, fx.slot_ids[0], Priority::Std))
            .unwrap_err();
        assert!(matches!(err, MedmisError::SlotFull(_)));
        assert_eq!(fx.store.find_slot(fx.slot_ids[0]).unwrap().taken, 1);
    }

    #[test]
    fn test_full_journey_to_done() {
        let fx = fixture();
        let item = fx.engine.book_slot(booking(&fx, fx.slot_ids[0], Priority::Sr)).unwrap();
        let operator = Uuid::new_v4();

        let study = fx.engine.start_study(item.id, operator).unwrap();
        assert_eq!(study.status, StudyStatus::InProgress);
        assert_eq!(study.modality, Modality::Mri);

        let file = FileMetadata {
            id: Uuid::new_v4(),
            name: "series-001.dcm".to_string(),
            size: 1024,
            content_type: "application/dicom".to_string(),
            signed_url: String::new(),
            storage_key: None,
            is_revoked: false,
            uploaded_at: Utc::now(),
        };
        let uploaded = fx.engine.upload_to_study(study.id, file).unwrap();
        assert_eq!(uploaded.status, StudyStatus::Uploaded);
        assert_eq!(uploaded.dicom.total_size, 1024);

        let described = fx.engine.finish_study(item.id).unwrap();
        assert_eq!(described.status, QueueStatus::Described);

        let done = fx.engine.mark_done(item.id).unwrap();
        assert_eq!(done.status, QueueStatus::Done);
    }

    #[test]
    fn test_done_requires_described() {
        let fx = fixture();
        let item = fx.engine.book_slot(booking(&fx, fx.slot_ids[0], Priority::Std)).unwrap();

        // Queued 直接 Done 不合法
        assert!(matches!(
            fx.engine.mark_done(item.id).unwrap_err(),
            MedmisError::InvalidTransition { .. }
        ));
        fx.engine.start_study(item.id, Uuid::new_v4()).unwrap();
        assert!(matches!(
            fx.engine.mark_done(item.id).unwrap_err(),
            MedmisError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_cancel_releases_slot_and_leaves_others() {
        let fx = fixture();
        let first = fx.engine.book_slot(booking(&fx, fx.slot_ids[0], Priority::Std)).unwrap();
        fx.engine.book_slot(booking(&fx, fx.slot_ids[1], Priority::Std)).unwrap();

        let cancelled = fx.engine.cancel(first.id).unwrap();
        assert_eq!(cancelled.status, QueueStatus::Cancelled);
        assert_eq!(fx.store.find_slot(fx.slot_ids[0]).unwrap().taken, 0);
        // 其他号源不受影响
        assert_eq!(fx.store.find_slot(fx.slot_ids[1]).unwrap().taken, 1);
    }

    #[test]
    fn test_no_show_only_from_queued() {
        let fx = fixture();
        let item = fx.engine.book_slot(booking(&fx, fx.slot_ids[0], Priority::Std)).unwrap();
        fx.engine.start_study(item.id, Uuid::new_v4()).unwrap();

        assert!(matches!(
            fx.engine.mark_no_show(item.id).unwrap_err(),
            MedmisError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_failed_transition_leaves_state_unchanged() {
        let fx = fixture();
        let item = fx.engine.book_slot(booking(&fx, fx.slot_ids[0], Priority::Std)).unwrap();
        let done_attempt = fx.engine.mark_done(item.id);
        assert!(done_attempt.is_err());

        let reloaded = fx.engine.queue_for_day(fx.clinic_id, date());
        assert_eq!(reloaded[0].status, QueueStatus::Queued);
    }

    #[test]
    fn test_escalation_one_step_and_ceiling() {
        let fx = fixture();
        let item = fx.engine.book_slot(booking(&fx, fx.slot_ids[0], Priority::Pln)).unwrap();

        assert_eq!(fx.engine.escalate(item.id).unwrap().priority, Priority::Std);
        assert_eq!(fx.engine.escalate(item.id).unwrap().priority, Priority::Sr);
        // 到顶保持 SR
        assert_eq!(fx.engine.escalate(item.id).unwrap().priority, Priority::Sr);
    }

    #[test]
    fn test_assignment_rejected_on_terminal() {
        let fx = fixture();
        let item = fx.engine.book_slot(booking(&fx, fx.slot_ids[0], Priority::Std)).unwrap();
        fx.engine.cancel(item.id).unwrap();

        assert!(matches!(
            fx.engine
                .assign_radiologist(item.id, Uuid::new_v4(), Uuid::new_v4())
                .unwrap_err(),
            MedmisError::InvalidTransition { .. }
        ));
        assert!(matches!(
            fx.engine.escalate(item.id).unwrap_err(),
            MedmisError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_upload_rejected_after_finish() {
        let fx = fixture();
        let item = fx.engine.book_slot(booking(&fx, fx.slot_ids[0], Priority::Std)).unwrap();
        let study = fx.engine.start_study(item.id, Uuid::new_v4()).unwrap();
        fx.engine.finish_study(item.id).unwrap();

        let file = FileMetadata {
            id: Uuid::new_v4(),
            name: "late-series.dcm".to_string(),
            size: 2048,
            content_type: "application/dicom".to_string(),
            signed_url: String::new(),
            storage_key: None,
            is_revoked: false,
            uploaded_at: Utc::now(),
        };
        // 已关闭的检查拒绝追加，记录保持不变
        assert!(matches!(
            fx.engine.upload_to_study(study.id, file).unwrap_err(),
            MedmisError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_set_priority_emits_priority_changed() {
        let fx = fixture();
        let item = fx.engine.book_slot(booking(&fx, fx.slot_ids[0], Priority::Sr)).unwrap();
        let mut rx = fx.bus.subscribe();

        let updated = fx.engine.set_priority(item.id, Priority::Pln).unwrap();
        assert_eq!(updated.priority, Priority::Pln);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type(), "queue.priority");
        assert!(matches!(event, DomainEvent::PriorityChanged { .. }));
    }

    #[test]
    fn test_manager_queue_priority_order() {
        let fx = fixture();
        let pln = fx.engine.book_slot(booking(&fx, fx.slot_ids[0], Priority::Pln)).unwrap();
        let sr = fx.engine.book_slot(booking(&fx, fx.slot_ids[1], Priority::Sr)).unwrap();
        let std_item = fx.engine.book_slot(booking(&fx, fx.slot_ids[2], Priority::Std)).unwrap();

        let queue = fx.engine.manager_queue(fx.clinic_id, date());
        let order: Vec<Uuid> = queue.iter().map(|i| i.id).collect();
        assert_eq!(order, vec![sr.id, std_item.id, pln.id]);
    }

    #[test]
    fn test_referral_flips_green_on_finish() {
        let fx = fixture();
        let referral = fx
            .engine
            .create_referral(ReferralRequest {
                referrer_id: Uuid::new_v4(),
                clinic_id: fx.clinic_id,
                slot_id: fx.slot_ids[0],
                patient_hint: PatientHint {
                    name: "Алиса".to_string(),
                    complaint: "боль в спине".to_string(),
                },
            })
            .unwrap();
        assert_eq!(referral.status, ReferralStatus::Yellow);

        let mut request = booking(&fx, fx.slot_ids[0], Priority::Std);
        request.referral_id = Some(referral.id);
        let item = fx.engine.book_slot(request).unwrap();

        fx.engine.start_study(item.id, Uuid::new_v4()).unwrap();
        fx.engine.finish_study(item.id).unwrap();

        // 黄转绿单向，重复作废被拒
        assert!(fx.engine.expire_referral(referral.id).is_err());
    }

    #[test]
    fn test_expire_referral_one_way() {
        let fx = fixture();
        let referral = fx
            .engine
            .create_referral(ReferralRequest {
                referrer_id: Uuid::new_v4(),
                clinic_id: fx.clinic_id,
                slot_id: fx.slot_ids[0],
                patient_hint: PatientHint {
                    name: "Боря".to_string(),
                    complaint: "кашель".to_string(),
                },
            })
            .unwrap();

        let expired = fx.engine.expire_referral(referral.id).unwrap();
        assert_eq!(expired.status, ReferralStatus::Red);
        assert!(fx.engine.expire_referral(referral.id).is_err());
    }
}
