//! # MEDMIS计费模块
//!
//! 从已完成的领域事件推导追加式账单行，包括：
//! - 积分规则：按优先级的报告费与转诊奖励，带百分比分成
//! - 计费账本：事件驱动的账单行生成、汇总查询与试算

pub mod ledger;
pub mod rules;

// 重新导出主要类型
pub use ledger::{BillingEvent, BillingLedger, DryRunResult, LedgerTotals};
pub use rules::{RuleSet, ScoreRule, SplitTarget};
