//! 错误定义模块

use thiserror::Error;

/// MEDMIS系统统一错误类型
#[derive(Error, Debug)]
pub enum MedmisError {
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("号源已满: {0}")]
    SlotFull(String),

    #[error("时间段重叠: {0}")]
    Overlap(String),

    #[error("容量冲突: {0}")]
    CapacityConflict(String),

    #[error("预约冲突: {0}")]
    BookingConflict(String),

    #[error("无效状态转换: 从 {from} 经 {event}")]
    InvalidTransition { from: String, event: String },

    #[error("数据冲突: {0}")]
    Conflict(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("策略不允许: {0}")]
    PolicyViolation(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("系统内部错误: {0}")]
    Internal(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MedmisError {
    /// 是否属于冲突类错误（容量/重叠/状态违例）
    ///
    /// 冲突类错误说明调用方持有过期视图，重试无意义，需要重新读取。
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::SlotFull(_)
                | Self::Overlap(_)
                | Self::CapacityConflict(_)
                | Self::BookingConflict(_)
                | Self::InvalidTransition { .. }
                | Self::Conflict(_)
        )
    }

    /// 调用方是否可以原样重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

/// MEDMIS系统统一结果类型
pub type Result<T> = std::result::Result<T, MedmisError>;
