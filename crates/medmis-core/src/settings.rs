//! 诊所策略配置
//!
//! 每个诊所一份策略，供可见性过滤和计费读取；管理端更新后对后续
//! 读取立即生效，不做版本化。

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MedmisError, Result};

/// 诊所级策略参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClinicPolicies {
    /// 转诊医生可见的当日号源百分比
    pub ref_slots_today_visibility_pct: u32,
    /// 号源对转诊医生/患者可见的最小提前量（分钟）
    pub ref_slots_today_min_offset_min: i64,
    /// 每小时预约上限
    pub per_hour_limit: u32,
    /// 患者自助预约折扣百分比
    pub self_booking_discount_pct: u32,
    /// 平台抽成百分比
    pub platform_cut_pct: u32,
}

impl Default for ClinicPolicies {
    fn default() -> Self {
        Self {
            ref_slots_today_visibility_pct: 50,
            ref_slots_today_min_offset_min: 60,
            per_hour_limit: 10,
            self_booking_discount_pct: 20,
            platform_cut_pct: 5,
        }
    }
}

impl ClinicPolicies {
    /// 校验各百分比取值范围
    pub fn validate(&self) -> Result<()> {
        if self.ref_slots_today_visibility_pct > 100 {
            return Err(MedmisError::Validation(
                "ref_slots_today_visibility_pct must be <= 100".into(),
            ));
        }
        if self.self_booking_discount_pct > 100 {
            return Err(MedmisError::Validation(
                "self_booking_discount_pct must be <= 100".into(),
            ));
        }
        if self.platform_cut_pct > 100 {
            return Err(MedmisError::Validation(
                "platform_cut_pct must be <= 100".into(),
            ));
        }
        if self.ref_slots_today_min_offset_min < 0 {
            return Err(MedmisError::Validation(
                "ref_slots_today_min_offset_min must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

/// 诊所配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicSettings {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub policies: ClinicPolicies,
}

/// 诊所配置存储
#[derive(Debug, Default)]
pub struct SettingsStore {
    settings: RwLock<HashMap<Uuid, ClinicSettings>>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取诊所策略，未配置的诊所返回默认值
    pub fn policies_for(&self, clinic_id: Uuid) -> ClinicPolicies {
        let settings = self.settings.read().expect("settings lock poisoned");
        settings
            .get(&clinic_id)
            .map(|s| s.policies.clone())
            .unwrap_or_default()
    }

    /// 更新诊所策略，立即生效
    pub fn upsert(&self, clinic_id: Uuid, policies: ClinicPolicies) -> Result<ClinicSettings> {
        policies.validate()?;
        let mut settings = self.settings.write().expect("settings lock poisoned");
        let entry = settings.entry(clinic_id).or_insert_with(|| ClinicSettings {
            id: Uuid::new_v4(),
            clinic_id,
            policies: ClinicPolicies::default(),
        });
        entry.policies = policies;
        tracing::info!("Updated policies for clinic {}", clinic_id);
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_unknown_clinic() {
        let store = SettingsStore::new();
        let policies = store.policies_for(Uuid::new_v4());
        assert_eq!(policies.ref_slots_today_visibility_pct, 50);
        assert_eq!(policies.ref_slots_today_min_offset_min, 60);
    }

    #[test]
    fn test_upsert_takes_effect_immediately() {
        let store = SettingsStore::new();
        let clinic = Uuid::new_v4();
        let mut policies = ClinicPolicies::default();
        policies.ref_slots_today_visibility_pct = 75;
        store.upsert(clinic, policies).unwrap();
        assert_eq!(store.policies_for(clinic).ref_slots_today_visibility_pct, 75);
    }

    #[test]
    fn test_invalid_percentage_rejected() {
        let store = SettingsStore::new();
        let mut policies = ClinicPolicies::default();
        policies.platform_cut_pct = 150;
        assert!(store.upsert(Uuid::new_v4(), policies).is_err());
    }
}
