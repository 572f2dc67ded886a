//! # MEDMIS集成模块
//!
//! 核心与外部协作方之间的服务边界：
//! - 类型化领域事件总线：核心发布精确的最小变更通知
//! - 权限查询服务：角色到固定权限集合的纯查表
//! - 文件存储服务：签名URL签发与吊销，核心只记录元数据
//! - 翻译存储：按语言的键值查询，仅用于展示

pub mod events;
pub mod file_storage;
pub mod permissions;
pub mod translation;

pub use events::{DomainEvent, EventBus};
pub use file_storage::{FileDescriptor, FileStorage, MockFileStorage, SignedUrl};
pub use permissions::{PermissionService, PermissionSet, StaticPermissionService};
pub use translation::{InMemoryTranslationStore, Language, TranslationStore};
