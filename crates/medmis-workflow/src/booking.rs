//! 患者自助预约
//!
//! 患者绕过转诊直接约号：按诊所策略打折计价，占用号源后生成
//! 预约单，支付与完成推进状态，完成事件供账本计费。同一预约单
//! 的状态推进按 id 持锁串行化，期望状态校验与落写在同一次
//! update 内完成。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use uuid::Uuid;

use medmis_core::{
    BookingSource, Clock, MedmisError, PatientBooking, PatientBookingStatus, Repository,
    Result, SettingsStore,
};
use medmis_integration::{DomainEvent, EventBus};
use medmis_scheduling::SlotStore;

/// 自助预约服务
pub struct SelfBookingService {
    bookings: Arc<dyn Repository<PatientBooking>>,
    store: Arc<SlotStore>,
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    booking_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SelfBookingService {
    pub fn new(
        bookings: Arc<dyn Repository<PatientBooking>>,
        store: Arc<SlotStore>,
        settings: Arc<SettingsStore>,
        clock: Arc<dyn Clock>,
        bus: EventBus,
    ) -> Self {
        Self {
            bookings,
            store,
            settings,
            clock,
            bus,
            booking_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 同一预约单的状态推进串行化
    fn booking_lock(&self, booking_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self
            .booking_locks
            .lock()
            .expect("booking service lock poisoned");
        Arc::clone(locks.entry(booking_id).or_default())
    }

    /// 自助约号
    ///
    /// 折扣按诊所策略即时生效，金额以分计，向下取整。单个患者
    /// 每小时的新建预约数受策略限制。
    pub fn book_self(
        &self,
        patient_id: Uuid,
        clinic_id: Uuid,
        slot_id: Uuid,
        price_cents: i64,
    ) -> Result<PatientBooking> {
        if price_cents < 0 {
            return Err(MedmisError::Validation(format!(
                "negative price {}",
                price_cents
            )));
        }
        let policies = self.settings.policies_for(clinic_id);
        let now = self.clock.now();

        let recent = self.bookings.select(&|b| {
            b.patient_id == patient_id
                && b.status != PatientBookingStatus::Cancelled
                && now - b.created_at < Duration::hours(1)
        });
        if recent.len() as u32 >= policies.per_hour_limit {
            return Err(MedmisError::PolicyViolation(format!(
                "patient {} exceeded {} bookings per hour",
                patient_id, policies.per_hour_limit
            )));
        }

        let discount_pct = policies.self_booking_discount_pct;
        let final_amount_cents = price_cents - price_cents * discount_pct as i64 / 100;

        let slot = self.store.reserve(slot_id)?;
        let booking = PatientBooking {
            id: Uuid::new_v4(),
            patient_id,
            clinic_id,
            room_id: slot.room_id,
            slot_id: slot.id,
            date: slot.date,
            start_at: slot.start_at,
            status: PatientBookingStatus::Booked,
            source: BookingSource::SelfService,
            price_cents,
            discount_pct,
            final_amount_cents,
            created_at: now,
        };
        if let Err(e) = self.bookings.insert(booking.clone()) {
            let _ = self.store.release(slot.id);
            return Err(e);
        }

        tracing::info!(
            booking_id = %booking.id,
            slot_id = %slot.id,
            final_amount_cents,
            "Self booking created"
        );
        self.bus.publish(DomainEvent::SlotReserved { slot });
        self.bus
            .publish(DomainEvent::BookingUpdated { booking: booking.clone() });
        Ok(booking)
    }

    /// 登记支付
    pub fn pay_booking(&self, booking_id: Uuid) -> Result<PatientBooking> {
        let lock = self.booking_lock(booking_id);
        let _guard = lock.lock().expect("booking lock poisoned");

        let updated = self.transition(booking_id, PatientBookingStatus::Booked, PatientBookingStatus::Paid)?;
        self.bus
            .publish(DomainEvent::BookingUpdated { booking: updated.clone() });
        Ok(updated)
    }

    /// 完成预约，触发计费事件
    pub fn complete_booking(&self, booking_id: Uuid) -> Result<PatientBooking> {
        let lock = self.booking_lock(booking_id);
        let _guard = lock.lock().expect("booking lock poisoned");

        let updated = self.transition(booking_id, PatientBookingStatus::Paid, PatientBookingStatus::Done)?;
        self.bus
            .publish(DomainEvent::SelfBookingCompleted { booking: updated.clone() });
        Ok(updated)
    }

    /// 取消预约并释放号源，仅未支付的预约可取消
    pub fn cancel_booking(&self, booking_id: Uuid) -> Result<PatientBooking> {
        let lock = self.booking_lock(booking_id);
        let _guard = lock.lock().expect("booking lock poisoned");

        let updated = self.transition(
            booking_id,
            PatientBookingStatus::Booked,
            PatientBookingStatus::Cancelled,
        )?;
        let slot = self.store.release(updated.slot_id)?;
        tracing::info!(booking_id = %booking_id, "Self booking cancelled");
        self.bus.publish(DomainEvent::SlotReleased { slot });
        self.bus
            .publish(DomainEvent::BookingUpdated { booking: updated.clone() });
        Ok(updated)
    }

    /// 改约到另一个号源
    ///
    /// 先占新号源再释放旧号源，新号源占用失败时原预约保持不变。
    pub fn reschedule_booking(&self, booking_id: Uuid, new_slot_id: Uuid) -> Result<PatientBooking> {
        let lock = self.booking_lock(booking_id);
        let _guard = lock.lock().expect("booking lock poisoned");

        let booking = self.bookings.get(booking_id)?;
        if booking.status != PatientBookingStatus::Booked {
            return Err(MedmisError::Conflict(format!(
                "booking {} is {:?}, only booked ones can be rescheduled",
                booking_id, booking.status
            )));
        }
        if booking.slot_id == new_slot_id {
            return Ok(booking);
        }

        let new_slot = self.store.reserve(new_slot_id)?;
        if let Err(e) = self.store.release(booking.slot_id) {
            let _ = self.store.release(new_slot_id);
            return Err(e);
        }
        let updated = self.bookings.update(booking_id, &mut |booking| {
            booking.slot_id = new_slot.id;
            booking.room_id = new_slot.room_id;
            booking.date = new_slot.date;
            booking.start_at = new_slot.start_at;
            Ok(())
        })?;

        tracing::info!(booking_id = %booking_id, new_slot_id = %new_slot_id, "Self booking rescheduled");
        self.bus.publish(DomainEvent::SlotReserved { slot: new_slot });
        self.bus
            .publish(DomainEvent::BookingUpdated { booking: updated.clone() });
        Ok(updated)
    }

    /// 调用方持有该预约单的锁；校验和落写在同一次 update 内完成
    fn transition(
        &self,
        booking_id: Uuid,
        expected: PatientBookingStatus,
        next: PatientBookingStatus,
    ) -> Result<PatientBooking> {
        self.bookings.update(booking_id, &mut |booking| {
            if booking.status != expected {
                return Err(MedmisError::InvalidTransition {
                    from: format!("{:?}", booking.status),
                    event: format!("{:?}", next),
                });
            }
            booking.status = next;
            Ok(())
        })
    }
}
