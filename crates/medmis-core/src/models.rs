//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::ranges_overlap;

/// 检查设备类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Modality {
    #[serde(rename = "MRI")]
    Mri,
    #[serde(rename = "CT")]
    Ct,
    #[serde(rename = "X-RAY")]
    Xray,
    #[serde(rename = "US")]
    Us,
}

/// 检查室运行状态（软删除：停用而非删除）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Up,
    Down,
    Maintenance,
}

/// 每周工作时段，同一 weekday 内各时段不得重叠
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkHour {
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// 检查室信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    pub code: String, // 诊所内部编码, 如 "MRI1"
    pub modality: Modality,
    pub capacity_per_hour: u32, // 每小时并行容量, >= 1
    pub work_hours: Vec<WorkHour>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// 与给定日期匹配的全部工作时段，按起始时间升序
    pub fn work_hours_for(&self, date: NaiveDate) -> Vec<WorkHour> {
        use chrono::Datelike;
        let mut hours: Vec<WorkHour> = self
            .work_hours
            .iter()
            .filter(|wh| wh.weekday == date.weekday())
            .copied()
            .collect();
        hours.sort_by_key(|wh| wh.start);
        hours
    }

    /// 检查室当前是否可接受预约
    pub fn is_bookable(&self) -> bool {
        self.status == RoomStatus::Up
    }
}

/// 号源：一个 (检查室, 日期, 起始时间) 的可预约容量单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub room_id: Uuid,
    pub date: NaiveDate,
    pub start_at: NaiveTime,
    pub end_at: NaiveTime,
    pub capacity: u32, // >= 1
    pub taken: u32,    // 0 <= taken <= capacity
}

impl Slot {
    pub fn is_full(&self) -> bool {
        self.taken >= self.capacity
    }

    /// 与半开区间 [from, to) 是否相交
    pub fn intersects(&self, from: NaiveTime, to: NaiveTime) -> bool {
        ranges_overlap(self.start_at, self.end_at, from, to)
    }

    /// 号源起始时刻（UTC）
    pub fn start_datetime(&self) -> DateTime<Utc> {
        self.date.and_time(self.start_at).and_utc()
    }
}

/// 停诊窗口，覆盖一天内的半开区间 [from, to)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blackout {
    pub id: Uuid,
    pub from: NaiveTime,
    pub to: NaiveTime,
    pub reason: Option<String>,
}

/// 队列优先级，全序 SR > STD > PLN
///
/// 枚举按升序声明，派生的 `Ord` 即为优先级次序。
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Priority {
    #[serde(rename = "PLN")]
    Pln, // 计划
    #[serde(rename = "STD")]
    Std, // 常规
    #[serde(rename = "SR")]
    Sr, // 加急
}

impl Priority {
    /// 升级一级，已到顶则保持不变
    pub fn escalated(self) -> Self {
        match self {
            Self::Pln => Self::Std,
            Self::Std => Self::Sr,
            Self::Sr => Self::Sr,
        }
    }
}

/// 患者队列状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,     // 已排队
    InProgress, // 检查中
    Described,  // 已出报告描述
    Done,       // 已完成
    NoShow,     // 爽约
    Cancelled,  // 已取消
}

impl QueueStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::NoShow | Self::Cancelled)
    }
}

/// 脱敏患者引用，核心不持有完整个人信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRef {
    pub id: Uuid,
    pub masked_name: String,
    pub age: Option<u32>,
}

/// 队列项：患者从预约到出报告的完整旅程
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub patient: PatientRef,
    pub clinic_id: Uuid,
    pub room_id: Uuid,
    pub slot_id: Uuid,
    pub date: NaiveDate,
    pub start_at: NaiveTime,
    pub priority: Priority,
    pub status: QueueStatus,
    pub complaints: String,
    pub referral_id: Option<Uuid>,
    pub radiologist_id: Option<Uuid>,
    pub assigned_by: Option<Uuid>,
    pub study_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// 检查记录状态（队列状态机的子集投影）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StudyStatus {
    InProgress, // 检查中
    Uploaded,   // 影像已上传
    Finished,   // 已结束
}

/// 文件元数据，字节内容由外部存储服务持有
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub signed_url: String,
    pub storage_key: Option<String>,
    pub is_revoked: bool,
    pub uploaded_at: DateTime<Utc>,
}

impl FileMetadata {
    pub fn is_dicom(&self) -> bool {
        self.content_type.starts_with("application/dicom") || self.name.ends_with(".dcm")
    }
}

/// DICOM 对象集合及累计大小
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DicomCollection {
    pub objects: Vec<FileMetadata>,
    pub total_size: u64,
}

/// 检查记录，与队列项一一对应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub id: Uuid,
    pub queue_item_id: Uuid,
    pub clinic_id: Uuid,
    pub room_id: Uuid,
    pub slot_id: Uuid,
    pub modality: Modality,
    pub operator_id: Uuid,
    pub radiologist_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dicom: DicomCollection,
    pub docs: Vec<FileMetadata>,
    pub status: StudyStatus,
}

/// 转诊单状态，单向 yellow→green 或 yellow→red
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Yellow, // 待使用
    Green,  // 已完成
    Red,    // 已过期/取消
}

/// 转诊患者提示信息（非完整病历）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientHint {
    pub name: String,
    pub complaint: String,
}

/// 转诊单：转诊医生针对特定号源的预授权
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub clinic_id: Uuid,
    pub room_id: Uuid,
    pub slot_id: Uuid,
    pub qr_code: String,
    pub short_code: String,
    pub patient_hint: PatientHint,
    pub status: ReferralStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Manager,
    Radiologist,
    Referrer,
    Patient,
    Finance,
    MrtOperator,
    Reception,
}

/// 账单行类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Charge,
    Payout,
    Correction,
}

/// 账单行关联元数据
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineMeta {
    pub queue_item_id: Option<Uuid>,
    pub referral_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
}

/// 账单行：不可变的追加式财务记录，金额以分计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementLine {
    pub line_type: LineType,
    pub amount_cents: i64,
    pub actor_role: UserRole,
    pub actor_id: Option<Uuid>,
    pub rule_name: String,
    pub meta: LineMeta,
    pub created_at: DateTime<Utc>,
}

/// 预约来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookingSource {
    #[serde(rename = "referral")]
    Referral,
    #[serde(rename = "self")]
    SelfService,
}

/// 患者自助预约状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatientBookingStatus {
    Booked,
    Paid,
    Done,
    Cancelled,
}

/// 患者自助预约记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientBooking {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub room_id: Uuid,
    pub slot_id: Uuid,
    pub date: NaiveDate,
    pub start_at: NaiveTime,
    pub status: PatientBookingStatus,
    pub source: BookingSource,
    pub price_cents: i64,
    pub discount_pct: u32,
    pub final_amount_cents: i64,
    pub created_at: DateTime<Utc>,
}
