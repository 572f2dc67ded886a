//! 权限查询服务
//!
//! 核心把权限当作纯查表：给定角色返回固定的权限集合，无副作用。
//! 会话与认证属于传输层，不在此处。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use medmis_core::UserRole;

/// 角色权限集合
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionSet {
    pub can_summarize_with_ai: bool,
    pub can_manage_dicom_policies: bool,
    pub can_upload_dicom: bool,
    pub can_view_dicom: bool,
    pub can_access_clinic_admin: bool,
    pub can_manage_rooms: bool,
    pub can_manage_tariffs: bool,
    pub can_manage_clinic_settings: bool,
}

/// 权限服务边界
pub trait PermissionService: Send + Sync {
    /// 角色到权限集合的纯查询，未知角色返回全否
    fn permissions_for(&self, role: UserRole) -> PermissionSet;
}

/// 静态权限表实现
#[derive(Debug)]
pub struct StaticPermissionService {
    table: HashMap<UserRole, PermissionSet>,
}

impl StaticPermissionService {
    /// 默认权限表
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert(
            UserRole::SuperAdmin,
            PermissionSet {
                can_summarize_with_ai: true,
                can_manage_dicom_policies: true,
                can_upload_dicom: true,
                can_view_dicom: true,
                can_access_clinic_admin: true,
                can_manage_rooms: true,
                can_manage_tariffs: true,
                can_manage_clinic_settings: true,
            },
        );
        table.insert(
            UserRole::Admin,
            PermissionSet {
                can_summarize_with_ai: true,
                can_manage_dicom_policies: true,
                can_upload_dicom: true,
                can_view_dicom: true,
                can_access_clinic_admin: true,
                can_manage_rooms: true,
                can_manage_tariffs: true,
                can_manage_clinic_settings: true,
            },
        );
        table.insert(
            UserRole::Manager,
            PermissionSet {
                can_summarize_with_ai: true,
                can_access_clinic_admin: true,
                can_manage_rooms: true,
                ..PermissionSet::default()
            },
        );
        table.insert(
            UserRole::Radiologist,
            PermissionSet {
                can_upload_dicom: true,
                can_view_dicom: true,
                ..PermissionSet::default()
            },
        );
        table.insert(
            UserRole::MrtOperator,
            PermissionSet {
                can_upload_dicom: true,
                can_view_dicom: true,
                ..PermissionSet::default()
            },
        );
        table.insert(
            UserRole::Reception,
            PermissionSet {
                can_summarize_with_ai: true,
                ..PermissionSet::default()
            },
        );
        table.insert(
            UserRole::Finance,
            PermissionSet {
                can_manage_tariffs: true,
                ..PermissionSet::default()
            },
        );
        table.insert(UserRole::Referrer, PermissionSet::default());
        table.insert(UserRole::Patient, PermissionSet::default());
        Self { table }
    }
}

impl Default for StaticPermissionService {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionService for StaticPermissionService {
    fn permissions_for(&self, role: UserRole) -> PermissionSet {
        self.table.get(&role).copied().unwrap_or_default()
    }
}
