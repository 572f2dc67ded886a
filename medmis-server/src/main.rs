//! MEDMIS服务器主程序

mod config;

use std::sync::Arc;

use chrono::{Duration, NaiveTime, Utc, Weekday};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};
use uuid::Uuid;

use medmis_billing::{BillingLedger, RuleSet};
use medmis_core::{
    Clock, InMemoryRepository, Modality, PatientBooking, QueueItem, Referral, Repository,
    Result, Room, RoomStatus, SettingsStore, Study, SystemClock, WorkHour,
};
use medmis_integration::{DomainEvent, EventBus};
use medmis_scheduling::{ScheduleEditor, SlotStore};
use medmis_workflow::{QueueEngine, SelfBookingService};

use crate::config::MedmisConfig;

/// MEDMIS服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "medmis-server")]
#[command(about = "MEDMIS 多诊所放射科预约排班与工作流服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("启动MEDMIS服务...");

    let cfg = MedmisConfig::load(args.config.as_deref())?;
    info!("MEDMIS服务配置:");
    info!("  服务名称: {}", cfg.server.name);
    info!("  预生成天数: {}", cfg.scheduling.seed_days);
    info!("  事件总线容量: {}", cfg.scheduling.event_bus_capacity);

    let bus = EventBus::new(cfg.scheduling.event_bus_capacity);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(SlotStore::new());
    let settings = Arc::new(SettingsStore::new());

    let rooms: Arc<dyn Repository<Room>> = Arc::new(InMemoryRepository::new());
    let items: Arc<dyn Repository<QueueItem>> = Arc::new(InMemoryRepository::new());
    let studies: Arc<dyn Repository<Study>> = Arc::new(InMemoryRepository::new());
    let referrals: Arc<dyn Repository<Referral>> = Arc::new(InMemoryRepository::new());
    let bookings: Arc<dyn Repository<PatientBooking>> = Arc::new(InMemoryRepository::new());

    let editor = ScheduleEditor::new(Arc::clone(&rooms), Arc::clone(&store), bus.clone());
    let _engine = QueueEngine::new(
        items,
        studies,
        referrals,
        Arc::clone(&rooms),
        Arc::clone(&store),
        Arc::clone(&clock),
        bus.clone(),
    );
    let _booking = SelfBookingService::new(
        bookings,
        Arc::clone(&store),
        Arc::clone(&settings),
        Arc::clone(&clock),
        bus.clone(),
    );

    let rules = Arc::new(RuleSet::with_defaults());
    let ledger = Arc::new(BillingLedger::new(
        rules,
        Arc::clone(&settings),
        Arc::clone(&clock),
    ));

    spawn_ledger_consumer(&bus, Arc::clone(&ledger));
    spawn_event_logger(&bus);

    seed_demo_clinic(&cfg, &rooms, &editor, &settings, &bus)?;

    info!("MEDMIS服务就绪，Ctrl+C 退出");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| medmis_core::MedmisError::Internal(e.to_string()))?;

    let totals = ledger.totals();
    info!(
        "MEDMIS服务关闭，账本共 {} 行，合计 {} 分",
        totals.line_count, totals.total_cents
    );
    Ok(())
}

/// 账本订阅事件总线，消费计费相关事件
fn spawn_ledger_consumer(bus: &EventBus, ledger: Arc<BillingLedger>) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = ledger.apply_domain_event(&event) {
                        error!("计费事件处理失败: {}", e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    error!("计费消费者落后，丢弃 {} 个事件", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// 把全部领域事件写进日志
fn spawn_event_logger(bus: &EventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    info!(
                        event_type = event.event_type(),
                        entity_id = %event.entity_id(),
                        "Domain event"
                    );
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// 初始化演示诊所：策略、检查室与未来几天的号源
fn seed_demo_clinic(
    cfg: &MedmisConfig,
    rooms: &Arc<dyn Repository<Room>>,
    editor: &ScheduleEditor,
    settings: &Arc<SettingsStore>,
    bus: &EventBus,
) -> Result<()> {
    let clinic_id = Uuid::new_v4();
    let policies = cfg.clinic_policies();
    settings.upsert(clinic_id, policies.clone())?;
    bus.publish(DomainEvent::PolicyChanged { clinic_id, policies });

    let weekdays = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ];
    let work_hours: Vec<WorkHour> = weekdays
        .iter()
        .map(|weekday| WorkHour {
            weekday: *weekday,
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
        })
        .collect();

    let specs = [("MRI1", Modality::Mri, 2), ("CT1", Modality::Ct, 4)];
    for (code, modality, capacity_per_hour) in specs {
        let room = Room {
            id: Uuid::new_v4(),
            clinic_id,
            name: format!("{}检查室", code),
            code: code.to_string(),
            modality,
            capacity_per_hour,
            work_hours: work_hours.clone(),
            status: RoomStatus::Up,
            created_at: Utc::now(),
        };
        let room_id = room.id;
        rooms.insert(room)?;

        let today = Utc::now().date_naive();
        let mut seeded = 0usize;
        for offset in 0..cfg.scheduling.seed_days {
            let date = today + Duration::days(offset as i64);
            seeded += editor.ensure_day(room_id, date)?.len();
        }
        info!("检查室 {} 预生成 {} 个号源", code, seeded);
    }
    Ok(())
}
