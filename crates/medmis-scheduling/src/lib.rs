//! # MEDMIS排班模块
//!
//! 提供号源排班与可见性管理功能，包括：
//! - 排班日历：从每周工作时段和小时容量推导标准号源网格
//! - 号源存储：容量占用的唯一事实来源，按 (检查室, 日期) 串行化
//! - 可见性过滤：按角色和诊所策略收窄可预约号源
//! - 排班编辑器：受控变更工作时段、号源网格与停诊窗口

pub mod availability;
pub mod calendar;
pub mod editor;
pub mod slot_store;

// 重新导出主要类型
pub use availability::{availability_quanta, visible_slots, AvailabilityQuantum};
pub use calendar::{quanta_for_day, slot_width_minutes};
pub use editor::ScheduleEditor;
pub use slot_store::SlotStore;
