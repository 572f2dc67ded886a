//! # MEDMIS工作流模块
//!
//! 管理患者从预约到出报告的完整旅程，包括：
//! - 队列状态机：约束队列项生命周期的合法转换
//! - 队列引擎：预约、开检、上传、出报告、完成与取消的事务入口
//! - 转诊流程：转诊单创建、消费与过期
//! - 患者自助预约：折扣计价、支付、取消与改约

pub mod booking;
pub mod engine;
pub mod state_machine;

// 重新导出主要类型
pub use booking::SelfBookingService;
pub use engine::{BookingRequest, QueueEngine, ReferralRequest};
pub use state_machine::{QueueEvent, QueueStateMachine, StudyEvent, StudyStateMachine};
