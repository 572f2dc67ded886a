//! 队列状态机
//!
//! 约束队列项与检查记录生命周期的合法状态转换。转换表之外的任何
//! (状态, 事件) 组合返回 `InvalidTransition` 且不产生部分效果。

use std::collections::HashMap;

use medmis_core::{MedmisError, QueueStatus, Result, StudyStatus};
use serde::{Deserialize, Serialize};

/// 队列状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QueueEvent {
    StudyStarted,   // 操作员开检
    StudyFinished,  // 操作员结束检查出描述
    MarkedDone,     // 放射科医生/经理确认完成
    MarkedNoShow,   // 标记爽约
    Cancelled,      // 取消
}

/// 检查记录状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StudyEvent {
    FileUploaded,
    Finished,
}

/// 队列状态机
#[derive(Debug)]
pub struct QueueStateMachine {
    transitions: HashMap<(QueueStatus, QueueEvent), QueueStatus>,
}

impl QueueStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义状态转换规则
        transitions.insert((QueueStatus::Queued, QueueEvent::StudyStarted), QueueStatus::InProgress);
        transitions.insert((QueueStatus::InProgress, QueueEvent::StudyFinished), QueueStatus::Described);
        transitions.insert((QueueStatus::Described, QueueEvent::MarkedDone), QueueStatus::Done);
        transitions.insert((QueueStatus::Queued, QueueEvent::MarkedNoShow), QueueStatus::NoShow);
        transitions.insert((QueueStatus::Queued, QueueEvent::Cancelled), QueueStatus::Cancelled);
        transitions.insert((QueueStatus::InProgress, QueueEvent::Cancelled), QueueStatus::Cancelled);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: QueueStatus, event: QueueEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: QueueStatus, event: QueueEvent) -> Result<QueueStatus> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(MedmisError::InvalidTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 获取状态的所有可能事件
    pub fn possible_events(&self, current: QueueStatus) -> Vec<QueueEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for QueueStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// 检查记录状态机，队列状态机的子集投影
#[derive(Debug)]
pub struct StudyStateMachine {
    transitions: HashMap<(StudyStatus, StudyEvent), StudyStatus>,
}

impl StudyStateMachine {
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 上传只改检查记录状态，队列项保持 InProgress
        transitions.insert((StudyStatus::InProgress, StudyEvent::FileUploaded), StudyStatus::Uploaded);
        transitions.insert((StudyStatus::Uploaded, StudyEvent::FileUploaded), StudyStatus::Uploaded);
        transitions.insert((StudyStatus::InProgress, StudyEvent::Finished), StudyStatus::Finished);
        transitions.insert((StudyStatus::Uploaded, StudyEvent::Finished), StudyStatus::Finished);

        Self { transitions }
    }

    pub fn can_transition(&self, from: StudyStatus, event: StudyEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    pub fn transition(&self, from: StudyStatus, event: StudyEvent) -> Result<StudyStatus> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(MedmisError::InvalidTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }
}

impl Default for StudyStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
