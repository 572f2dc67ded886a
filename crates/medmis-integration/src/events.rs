//! 领域事件总线
//!
//! 以带类型的事件枚举取代按字符串频道名广播的旧模式；事件载荷是
//! 被变更的实体本身加事件类型，订阅方可以据此做增量更新。
//! 投递语义为 fire-and-forget、至少一次，核心不等待确认。

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use medmis_core::{
    ClinicPolicies, PatientBooking, QueueItem, QueueStatus, Referral, Room, Slot, Study,
};

/// 领域事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    SlotReserved { slot: Slot },
    SlotReleased { slot: Slot },
    ScheduleChanged { room_id: Uuid, date: NaiveDate },
    RoomUpdated { room: Room },
    QueueCreated { item: QueueItem },
    QueueTransitioned { item: QueueItem, from: QueueStatus },
    PriorityEscalated { item: QueueItem },
    PriorityChanged { item: QueueItem },
    RadiologistAssigned { item: QueueItem },
    StudyStarted { study: Study },
    StudyUploaded { study: Study },
    StudyFinished { study: Study },
    ReferralCreated { referral: Referral },
    ReferralCompleted { referral: Referral },
    ReferralExpired { referral: Referral },
    BookingUpdated { booking: PatientBooking },
    SelfBookingCompleted { booking: PatientBooking },
    PolicyChanged { clinic_id: Uuid, policies: ClinicPolicies },
}

impl DomainEvent {
    /// 事件类型标识，沿用点分频道命名
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SlotReserved { .. } => "slot.reserved",
            Self::SlotReleased { .. } => "slot.released",
            Self::ScheduleChanged { .. } => "room.schedule.updated",
            Self::RoomUpdated { .. } => "room.updated",
            Self::QueueCreated { .. } => "queue.created",
            Self::QueueTransitioned { .. } => "queue.updated",
            Self::PriorityEscalated { .. } => "queue.escalated",
            Self::PriorityChanged { .. } => "queue.priority",
            Self::RadiologistAssigned { .. } => "queue.assigned",
            Self::StudyStarted { .. } => "study.started",
            Self::StudyUploaded { .. } => "study.uploaded",
            Self::StudyFinished { .. } => "study.finished",
            Self::ReferralCreated { .. } => "ref.created",
            Self::ReferralCompleted { .. } => "ref.updated",
            Self::ReferralExpired { .. } => "ref.expired",
            Self::BookingUpdated { .. } => "pat.booking.update",
            Self::SelfBookingCompleted { .. } => "pat.booking.self",
            Self::PolicyChanged { .. } => "sa.policy.changed",
        }
    }

    /// 被变更实体的标识
    pub fn entity_id(&self) -> Uuid {
        match self {
            Self::SlotReserved { slot } | Self::SlotReleased { slot } => slot.id,
            Self::ScheduleChanged { room_id, .. } => *room_id,
            Self::RoomUpdated { room } => room.id,
            Self::QueueCreated { item }
            | Self::QueueTransitioned { item, .. }
            | Self::PriorityEscalated { item }
            | Self::PriorityChanged { item }
            | Self::RadiologistAssigned { item } => item.id,
            Self::StudyStarted { study }
            | Self::StudyUploaded { study }
            | Self::StudyFinished { study } => study.id,
            Self::ReferralCreated { referral }
            | Self::ReferralCompleted { referral }
            | Self::ReferralExpired { referral } => referral.id,
            Self::BookingUpdated { booking } | Self::SelfBookingCompleted { booking } => {
                booking.id
            }
            Self::PolicyChanged { clinic_id, .. } => *clinic_id,
        }
    }
}

/// 事件总线
///
/// 基于 `tokio::sync::broadcast`：发布不阻塞，落后的订阅者丢弃最旧
/// 事件。没有订阅者时发布静默成功。
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 发布事件，fire-and-forget
    pub fn publish(&self, event: DomainEvent) {
        tracing::debug!(
            event_type = event.event_type(),
            entity_id = %event.entity_id(),
            "Publishing domain event"
        );
        // 无订阅者属于正常情况
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
