//! 工作流演示程序
//!
//! 展示从排班、转诊、预约到出报告的完整患者旅程

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use uuid::Uuid;

use medmis::billing::{BillingLedger, RuleSet};
use medmis::core::{
    Clock, FixedClock, InMemoryRepository, Modality, PatientHint, PatientRef, Priority,
    Repository, Room, RoomStatus, SettingsStore, UserRole, WorkHour,
};
use medmis::integration::EventBus;
use medmis::scheduling::{visible_slots, ScheduleEditor, SlotStore};
use medmis::workflow::{BookingRequest, QueueEngine, ReferralRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚀 MEDMIS 工作流演示\n");

    // 1. 搭建诊所环境
    let clinic_id = Uuid::new_v4();
    let bus = EventBus::default();
    let store = Arc::new(SlotStore::new());
    let settings = Arc::new(SettingsStore::new());
    let rooms: Arc<dyn Repository<Room>> = Arc::new(InMemoryRepository::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 7, 1, 7, 0, 0).unwrap(),
    ));

    let editor = ScheduleEditor::new(Arc::clone(&rooms), Arc::clone(&store), bus.clone());
    let engine = QueueEngine::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(InMemoryRepository::new()),
        Arc::new(InMemoryRepository::new()),
        Arc::clone(&rooms),
        Arc::clone(&store),
        Arc::clone(&clock) as Arc<dyn Clock>,
        bus.clone(),
    );
    let ledger = Arc::new(BillingLedger::new(
        Arc::new(RuleSet::with_defaults()),
        Arc::clone(&settings),
        Arc::clone(&clock) as Arc<dyn Clock>,
    ));

    // 账本订阅事件总线
    let mut rx = bus.subscribe();
    let ledger_task = Arc::clone(&ledger);
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            let _ = ledger_task.apply_domain_event(&event);
        }
    });

    // 2. 创建检查室并生成号源
    let room = Room {
        id: Uuid::new_v4(),
        clinic_id,
        name: "MRI检查室".to_string(),
        code: "MRI1".to_string(),
        modality: Modality::Mri,
        capacity_per_hour: 2,
        work_hours: vec![WorkHour {
            weekday: Weekday::Mon,
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        }],
        status: RoomStatus::Up,
        created_at: Utc::now(),
    };
    let room_id = room.id;
    rooms.insert(room)?;

    let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let slots = editor.ensure_day(room_id, date)?;
    println!("✅ 检查室 MRI1 生成 {} 个号源", slots.len());

    // 3. 转诊医生视角的可见号源
    let policies = settings.policies_for(clinic_id);
    let referrer_view = visible_slots(&slots, UserRole::Referrer, &policies, clock.now());
    println!(
        "👀 转诊医生可见 {} 个号源（全部 {} 个，当日限 {}%）",
        referrer_view.len(),
        slots.len(),
        policies.ref_slots_today_visibility_pct
    );

    // 4. 开转诊单并预约
    let referral = engine.create_referral(ReferralRequest {
        referrer_id: Uuid::new_v4(),
        clinic_id,
        slot_id: referrer_view[0].id,
        patient_hint: PatientHint {
            name: "Алиса П.".to_string(),
            complaint: "головная боль".to_string(),
        },
    })?;
    println!("📨 转诊单 {} 创建（{:?}）", referral.short_code, referral.status);

    let item = engine.book_slot(BookingRequest {
        patient: PatientRef {
            id: Uuid::new_v4(),
            masked_name: "Алиса П.".to_string(),
            age: Some(34),
        },
        clinic_id,
        slot_id: referral.slot_id,
        priority: Priority::Sr,
        complaints: "головная боль".to_string(),
        referral_id: Some(referral.id),
    })?;
    println!("📋 患者入队 {} (优先级: {:?})", item.id, item.priority);

    // 5. 检查与出报告
    let operator_id = Uuid::new_v4();
    let radiologist_id = Uuid::new_v4();
    engine.assign_radiologist(item.id, radiologist_id, operator_id)?;
    let study = engine.start_study(item.id, operator_id)?;
    println!("🩻 检查开始 {} ({:?})", study.id, study.modality);

    let described = engine.finish_study(item.id)?;
    println!("📝 报告已出描述，队列状态: {:?}", described.status);
    let done = engine.mark_done(item.id)?;
    println!("✅ 旅程完成，终态: {:?}", done.status);

    // 6. 查看经理队列与账本
    let queue = engine.manager_queue(clinic_id, date);
    println!("\n📊 经理队列剩余 {} 项", queue.len());

    // 等账本消费完事件
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let totals = ledger.totals();
    println!("💰 账本 {} 行，合计 {} 分", totals.line_count, totals.total_cents);
    for (rule, cents) in &totals.by_rule_cents {
        println!("   - {}: {} 分", rule, cents);
    }

    Ok(())
}
