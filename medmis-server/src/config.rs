//! 配置管理
//!
//! 分层加载：内置默认值、可选配置文件、MEDMIS_ 前缀环境变量，
//! 后者覆盖前者。

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use medmis_core::{ClinicPolicies, MedmisError, Result};

/// 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedmisConfig {
    pub server: ServerConfig,
    pub scheduling: SchedulingConfig,
    pub policies: PolicyConfig,
}

/// 服务器基本信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 服务名称
    pub name: String,
}

/// 排班相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// 预生成号源的天数
    pub seed_days: u32,
    /// 事件总线容量
    pub event_bus_capacity: usize,
}

/// 诊所策略默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub ref_slots_today_visibility_pct: u32,
    pub ref_slots_today_min_offset_min: i64,
    pub per_hour_limit: u32,
    pub self_booking_discount_pct: u32,
    pub platform_cut_pct: u32,
}

impl MedmisConfig {
    /// 加载配置
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = ClinicPolicies::default();
        let mut builder = Config::builder()
            .set_default("server.name", "medmis")
            .and_then(|b| b.set_default("scheduling.seed_days", 7i64))
            .and_then(|b| b.set_default("scheduling.event_bus_capacity", 256i64))
            .and_then(|b| {
                b.set_default(
                    "policies.ref_slots_today_visibility_pct",
                    defaults.ref_slots_today_visibility_pct as i64,
                )
            })
            .and_then(|b| {
                b.set_default(
                    "policies.ref_slots_today_min_offset_min",
                    defaults.ref_slots_today_min_offset_min,
                )
            })
            .and_then(|b| b.set_default("policies.per_hour_limit", defaults.per_hour_limit as i64))
            .and_then(|b| {
                b.set_default(
                    "policies.self_booking_discount_pct",
                    defaults.self_booking_discount_pct as i64,
                )
            })
            .and_then(|b| {
                b.set_default("policies.platform_cut_pct", defaults.platform_cut_pct as i64)
            })
            .map_err(|e| MedmisError::Config(e.to_string()))?;

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(Environment::with_prefix("MEDMIS").separator("__"));

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| MedmisError::Config(e.to_string()))?;
        config.clinic_policies().validate()?;
        Ok(config)
    }

    /// 转为诊所策略
    pub fn clinic_policies(&self) -> ClinicPolicies {
        ClinicPolicies {
            ref_slots_today_visibility_pct: self.policies.ref_slots_today_visibility_pct,
            ref_slots_today_min_offset_min: self.policies.ref_slots_today_min_offset_min,
            per_hour_limit: self.policies.per_hour_limit,
            self_booking_discount_pct: self.policies.self_booking_discount_pct,
            platform_cut_pct: self.policies.platform_cut_pct,
        }
    }
}
