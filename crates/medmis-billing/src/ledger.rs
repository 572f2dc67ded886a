//! 计费账本
//!
//! 消费已完成的领域事件生成追加式账单行。每个触发事件同时留档
//! 为可重放的计费事件，试算用候选规则重放全部历史事件，对比
//! 汇总差额，不写任何账单行。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use medmis_core::{
    Clock, LineMeta, LineType, MedmisError, Priority, QueueStatus, Result, SettingsStore,
    StatementLine, UserRole,
};
use medmis_integration::DomainEvent;

use crate::rules::{
    allocate_cents, report_fee_rule_name, RuleSet, ScoreRule, SplitTarget, REFERRER_BONUS_RULE,
};

/// 可重放的计费事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BillingEvent {
    StudyDescribed {
        queue_item_id: Uuid,
        clinic_id: Uuid,
        radiologist_id: Option<Uuid>,
        priority: Priority,
    },
    ReferralDone {
        referral_id: Uuid,
        clinic_id: Uuid,
        referrer_id: Uuid,
    },
    SelfBookingDone {
        booking_id: Uuid,
        clinic_id: Uuid,
        final_amount_cents: i64,
    },
}

/// 账本汇总
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub line_count: usize,
    pub total_cents: i64,
    pub by_rule_cents: HashMap<String, i64>,
}

/// 试算结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunResult {
    pub replayed_events: usize,
    pub previous_total_cents: i64,
    pub new_total_cents: i64,
    pub delta_cents: i64,
}

/// 计费账本
pub struct BillingLedger {
    rules: Arc<RuleSet>,
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    lines: RwLock<Vec<StatementLine>>,
    events: RwLock<Vec<BillingEvent>>,
}

impl BillingLedger {
    pub fn new(rules: Arc<RuleSet>, settings: Arc<SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rules,
            settings,
            clock,
            lines: RwLock::new(Vec::new()),
            events: RwLock::new(Vec::new()),
        }
    }

    /// 从领域事件流取走计费相关的事件
    ///
    /// 出描述的队列转换、转诊完成和自助预约完成各计一次，其余
    /// 事件忽略。返回本次新增的账单行。
    pub fn apply_domain_event(&self, event: &DomainEvent) -> Result<Vec<StatementLine>> {
        let billing_event = match event {
            DomainEvent::QueueTransitioned { item, .. }
                if item.status == QueueStatus::Described =>
            {
                BillingEvent::StudyDescribed {
                    queue_item_id: item.id,
                    clinic_id: item.clinic_id,
                    radiologist_id: item.radiologist_id,
                    priority: item.priority,
                }
            }
            DomainEvent::ReferralCompleted { referral } => BillingEvent::ReferralDone {
                referral_id: referral.id,
                clinic_id: referral.clinic_id,
                referrer_id: referral.referrer_id,
            },
            DomainEvent::SelfBookingCompleted { booking } => BillingEvent::SelfBookingDone {
                booking_id: booking.id,
                clinic_id: booking.clinic_id,
                final_amount_cents: booking.final_amount_cents,
            },
            _ => return Ok(Vec::new()),
        };
        self.record(billing_event)
    }

    /// 记账：生成账单行并留档事件
    pub fn record(&self, event: BillingEvent) -> Result<Vec<StatementLine>> {
        let new_lines = self.lines_for(&event, &self.rules.snapshot())?;

        let mut lines = self.lines.write().expect("ledger lock poisoned");
        let mut events = self.events.write().expect("ledger lock poisoned");
        lines.extend(new_lines.iter().cloned());
        events.push(event);

        tracing::info!(lines = new_lines.len(), "Statement lines recorded");
        Ok(new_lines)
    }

    fn lines_for(
        &self,
        event: &BillingEvent,
        rules: &HashMap<String, ScoreRule>,
    ) -> Result<Vec<StatementLine>> {
        let now = self.clock.now();
        match event {
            BillingEvent::StudyDescribed {
                queue_item_id,
                radiologist_id,
                priority,
                ..
            } => {
                let rule_name = report_fee_rule_name(*priority);
                let rule = rules.get(rule_name).ok_or_else(|| {
                    MedmisError::Config(format!("missing rule '{}'", rule_name))
                })?;
                let meta = LineMeta {
                    queue_item_id: Some(*queue_item_id),
                    ..LineMeta::default()
                };
                Ok(allocate_cents(rule.points_cents, &rule.splits)
                    .into_iter()
                    .map(|(target, amount_cents)| StatementLine {
                        line_type: split_line_type(target),
                        amount_cents,
                        actor_role: split_actor_role(target),
                        actor_id: match target {
                            SplitTarget::Radiologist => *radiologist_id,
                            _ => None,
                        },
                        rule_name: rule.name.clone(),
                        meta: meta.clone(),
                        created_at: now,
                    })
                    .collect())
            }
            BillingEvent::ReferralDone {
                referral_id,
                referrer_id,
                ..
            } => {
                let rule = rules.get(REFERRER_BONUS_RULE).ok_or_else(|| {
                    MedmisError::Config(format!("missing rule '{}'", REFERRER_BONUS_RULE))
                })?;
                let meta = LineMeta {
                    referral_id: Some(*referral_id),
                    ..LineMeta::default()
                };
                Ok(allocate_cents(rule.points_cents, &rule.splits)
                    .into_iter()
                    .map(|(target, amount_cents)| StatementLine {
                        line_type: split_line_type(target),
                        amount_cents,
                        actor_role: split_actor_role(target),
                        actor_id: match target {
                            SplitTarget::Referrer => Some(*referrer_id),
                            _ => None,
                        },
                        rule_name: rule.name.clone(),
                        meta: meta.clone(),
                        created_at: now,
                    })
                    .collect())
            }
            BillingEvent::SelfBookingDone {
                booking_id,
                clinic_id,
                final_amount_cents,
            } => {
                let policies = self.settings.policies_for(*clinic_id);
                let cut_cents = final_amount_cents * policies.platform_cut_pct as i64 / 100;
                Ok(vec![StatementLine {
                    line_type: LineType::Charge,
                    amount_cents: cut_cents,
                    actor_role: UserRole::SuperAdmin,
                    actor_id: None,
                    rule_name: "platform_cut".to_string(),
                    meta: LineMeta {
                        booking_id: Some(*booking_id),
                        ..LineMeta::default()
                    },
                    created_at: now,
                }])
            }
        }
    }

    /// 全部账单行的快照
    pub fn lines(&self) -> Vec<StatementLine> {
        self.lines.read().expect("ledger lock poisoned").clone()
    }

    /// 某个参与者的账单
    pub fn statement_for(&self, actor_id: Uuid) -> Vec<StatementLine> {
        self.lines
            .read()
            .expect("ledger lock poisoned")
            .iter()
            .filter(|line| line.actor_id == Some(actor_id))
            .cloned()
            .collect()
    }

    /// 汇总
    pub fn totals(&self) -> LedgerTotals {
        let lines = self.lines.read().expect("ledger lock poisoned");
        let mut totals = LedgerTotals {
            line_count: lines.len(),
            ..LedgerTotals::default()
        };
        for line in lines.iter() {
            totals.total_cents += line.amount_cents;
            *totals.by_rule_cents.entry(line.rule_name.clone()).or_insert(0) +=
                line.amount_cents;
        }
        totals
    }

    /// 试算：用候选规则重放全部历史计费事件
    ///
    /// 只计算假设汇总，已存储的账单行保持原样。
    pub fn dry_run(&self, candidate: &RuleSet) -> Result<DryRunResult> {
        let events = self.events.read().expect("ledger lock poisoned").clone();
        let rules = candidate.snapshot();

        let mut new_total_cents = 0i64;
        for event in &events {
            for line in self.lines_for(event, &rules)? {
                new_total_cents += line.amount_cents;
            }
        }
        let previous_total_cents = self.totals().total_cents;
        Ok(DryRunResult {
            replayed_events: events.len(),
            previous_total_cents,
            new_total_cents,
            delta_cents: new_total_cents - previous_total_cents,
        })
    }
}

fn split_actor_role(target: SplitTarget) -> UserRole {
    match target {
        SplitTarget::Radiologist => UserRole::Radiologist,
        SplitTarget::Referrer => UserRole::Referrer,
        SplitTarget::Platform => UserRole::SuperAdmin,
    }
}

fn split_line_type(target: SplitTarget) -> LineType {
    match target {
        SplitTarget::Platform => LineType::Charge,
        _ => LineType::Payout,
    }
}
