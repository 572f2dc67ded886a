//! 计费演示程序
//!
//! 展示积分规则分账、自助预约折扣与规则试算

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use medmis::billing::{BillingEvent, BillingLedger, RuleSet, ScoreRule, SplitTarget};
use medmis::core::{FixedClock, Priority, SettingsStore};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚀 MEDMIS 计费演示\n");

    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap(),
    ));
    let rules = Arc::new(RuleSet::with_defaults());
    let settings = Arc::new(SettingsStore::new());
    let ledger = BillingLedger::new(Arc::clone(&rules), settings, clock);

    // 1. SR 报告费分账
    let radiologist_id = Uuid::new_v4();
    let lines = ledger.record(BillingEvent::StudyDescribed {
        queue_item_id: Uuid::new_v4(),
        clinic_id: Uuid::new_v4(),
        radiologist_id: Some(radiologist_id),
        priority: Priority::Sr,
    })?;
    println!("📝 SR 报告计费 {} 行:", lines.len());
    for line in &lines {
        println!(
            "   - {:?} {:?}: {} 分 ({})",
            line.line_type, line.actor_role, line.amount_cents, line.rule_name
        );
    }

    // 2. 转诊奖励
    ledger.record(BillingEvent::ReferralDone {
        referral_id: Uuid::new_v4(),
        clinic_id: Uuid::new_v4(),
        referrer_id: Uuid::new_v4(),
    })?;
    println!("📨 转诊奖励入账");

    // 3. 自助预约平台抽成
    ledger.record(BillingEvent::SelfBookingDone {
        booking_id: Uuid::new_v4(),
        clinic_id: Uuid::new_v4(),
        final_amount_cents: 8_000,
    })?;
    println!("💳 自助预约抽成入账");

    let totals = ledger.totals();
    println!("\n📊 当前账本 {} 行，合计 {} 分", totals.line_count, totals.total_cents);

    // 4. 试算：SR 报告费涨到 40.00
    let candidate = RuleSet::with_defaults();
    candidate.upsert(ScoreRule::new(
        "radiology_sr_fee",
        4_000,
        &[(SplitTarget::Radiologist, 0.8), (SplitTarget::Platform, 0.2)],
    ))?;
    let preview = ledger.dry_run(&candidate)?;
    println!("\n🔍 规则试算（重放 {} 个事件）:", preview.replayed_events);
    println!("   当前合计: {} 分", preview.previous_total_cents);
    println!("   新规则合计: {} 分", preview.new_total_cents);
    println!("   差额: {:+} 分", preview.delta_cents);

    // 实际账本保持不变
    assert_eq!(ledger.totals().total_cents, totals.total_cents);
    println!("\n✅ 试算未改动已存储账单");

    // 5. 医生个人账单
    let statement = ledger.statement_for(radiologist_id);
    println!(
        "👨‍⚕️ 放射科医生账单 {} 行，合计 {} 分",
        statement.len(),
        statement.iter().map(|l| l.amount_cents).sum::<i64>()
    );

    Ok(())
}
