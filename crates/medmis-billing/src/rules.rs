//! 积分规则
//!
//! 每条规则一个积分值（以分计）加一组百分比分成。分成比例之和
//! 必须为 1.0，在规则更新时校验，账本落写阶段不再检查。

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use medmis_core::{MedmisError, Priority, Result};

const SPLIT_SUM_TOLERANCE: f64 = 1e-9;

/// 分成对象
///
/// 按声明顺序迭代，整数分账的凑整余数落到最后一个对象（平台）。
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum SplitTarget {
    Radiologist,
    Referrer,
    Platform,
}

/// 积分规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRule {
    pub name: String,
    /// 积分值，以分计
    pub points_cents: i64,
    pub splits: BTreeMap<SplitTarget, f64>,
}

impl ScoreRule {
    pub fn new(name: &str, points_cents: i64, splits: &[(SplitTarget, f64)]) -> Self {
        Self {
            name: name.to_string(),
            points_cents,
            splits: splits.iter().copied().collect(),
        }
    }

    /// 分成比例之和为 1.0 且积分非负
    pub fn validate(&self) -> Result<()> {
        if self.points_cents < 0 {
            return Err(MedmisError::Validation(format!(
                "rule '{}' has negative points",
                self.name
            )));
        }
        if self.splits.is_empty() {
            return Err(MedmisError::Validation(format!(
                "rule '{}' has no split targets",
                self.name
            )));
        }
        let sum: f64 = self.splits.values().sum();
        if (sum - 1.0).abs() > SPLIT_SUM_TOLERANCE {
            return Err(MedmisError::Validation(format!(
                "rule '{}' splits sum to {}, expected 1.0",
                self.name, sum
            )));
        }
        Ok(())
    }
}

/// 按优先级选择报告费规则名
pub fn report_fee_rule_name(priority: Priority) -> &'static str {
    match priority {
        Priority::Sr => "radiology_sr_fee",
        Priority::Std => "radiology_std_fee",
        Priority::Pln => "radiology_pln_fee",
    }
}

/// 转诊完成奖励规则名
pub const REFERRER_BONUS_RULE: &str = "referrer_bonus";

/// 规则集
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: RwLock<HashMap<String, ScoreRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 平台默认规则
    pub fn with_defaults() -> Self {
        let set = Self::new();
        let report_splits = [(SplitTarget::Radiologist, 0.8), (SplitTarget::Platform, 0.2)];
        let defaults = [
            ScoreRule::new("radiology_sr_fee", 3_000, &report_splits),
            ScoreRule::new("radiology_std_fee", 2_000, &report_splits),
            ScoreRule::new("radiology_pln_fee", 1_500, &report_splits),
            ScoreRule::new(
                REFERRER_BONUS_RULE,
                11_000,
                &[(SplitTarget::Referrer, 0.9), (SplitTarget::Platform, 0.1)],
            ),
        ];
        for rule in defaults {
            // 内置规则满足校验
            let _ = set.upsert(rule);
        }
        set
    }

    /// 新增或替换规则，校验失败整体拒绝
    pub fn upsert(&self, rule: ScoreRule) -> Result<ScoreRule> {
        rule.validate()?;
        let mut rules = self.rules.write().expect("rule set lock poisoned");
        tracing::info!(rule = %rule.name, points_cents = rule.points_cents, "Rule upserted");
        rules.insert(rule.name.clone(), rule.clone());
        Ok(rule)
    }

    pub fn get(&self, name: &str) -> Option<ScoreRule> {
        let rules = self.rules.read().expect("rule set lock poisoned");
        rules.get(name).cloned()
    }

    /// 当前全部规则的一致性快照
    pub fn snapshot(&self) -> HashMap<String, ScoreRule> {
        let rules = self.rules.read().expect("rule set lock poisoned");
        rules.clone()
    }
}

/// 整数分账
///
/// 每个对象按比例四舍五入取分，余数由最后一个对象吸收，各行
/// 金额之和恒等于总额。
pub fn allocate_cents(
    total_cents: i64,
    splits: &BTreeMap<SplitTarget, f64>,
) -> Vec<(SplitTarget, i64)> {
    let mut out = Vec::with_capacity(splits.len());
    let mut allocated = 0i64;
    for (i, (target, fraction)) in splits.iter().enumerate() {
        let amount = if i + 1 == splits.len() {
            total_cents - allocated
        } else {
            (total_cents as f64 * fraction).round() as i64
        };
        allocated += amount;
        out.push((*target, amount));
    }
    out
}
