//! # MEDMIS
//!
//! 多诊所放射科预约排班与工作流平台核心的统一入口，
//! 重新导出各子 crate 的主要类型，供演示程序和集成方使用。

pub use medmis_billing as billing;
pub use medmis_core as core;
pub use medmis_integration as integration;
pub use medmis_scheduling as scheduling;
pub use medmis_workflow as workflow;
