//! # MEDMIS Core
//!
//! 系统的核心模块，提供基础数据结构、错误定义、仓储抽象、
//! 时钟注入和诊所策略配置。

pub mod clock;
pub mod error;
pub mod models;
pub mod repo;
pub mod settings;
pub mod utils;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{MedmisError, Result};
pub use models::*;
pub use repo::{Entity, InMemoryRepository, Repository};
pub use settings::{ClinicPolicies, ClinicSettings, SettingsStore};
pub use utils::{format_hhmm, has_internal_overlap, parse_hhmm, ranges_overlap};
