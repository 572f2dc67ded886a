//! 文件存储服务边界
//!
//! 核心只记录文件元数据和签名URL，永不接触字节内容。
//! 真实实现由对象存储适配；内存 Mock 用于测试和演示。

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use medmis_core::{MedmisError, Result};

/// 待签名的文件描述
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub file_id: Uuid,
    pub name: String,
    pub content_type: String,
}

/// 限时签名URL
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// 文件存储服务接口
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// 为文件签发限时访问URL
    async fn sign_url(&self, descriptor: &FileDescriptor) -> Result<SignedUrl>;

    /// 吊销文件的全部已签发链接
    async fn revoke(&self, file_id: Uuid) -> Result<()>;

    /// 链接是否已被吊销
    async fn is_revoked(&self, file_id: Uuid) -> bool;
}

/// 内存Mock实现
#[derive(Debug, Default)]
pub struct MockFileStorage {
    revoked: RwLock<HashSet<Uuid>>,
    ttl_hours: i64,
}

impl MockFileStorage {
    pub fn new() -> Self {
        Self {
            revoked: RwLock::new(HashSet::new()),
            ttl_hours: 1,
        }
    }
}

#[async_trait]
impl FileStorage for MockFileStorage {
    async fn sign_url(&self, descriptor: &FileDescriptor) -> Result<SignedUrl> {
        if self.is_revoked(descriptor.file_id).await {
            return Err(MedmisError::PolicyViolation(format!(
                "file {} links are revoked",
                descriptor.file_id
            )));
        }
        let expires_at = Utc::now() + Duration::hours(self.ttl_hours.max(1));
        Ok(SignedUrl {
            url: format!(
                "https://mockstorage.local/files/{}?token=mock-{}&contentType={}",
                descriptor.file_id,
                expires_at.timestamp(),
                descriptor.content_type
            ),
            expires_at,
        })
    }

    async fn revoke(&self, file_id: Uuid) -> Result<()> {
        let mut revoked = self.revoked.write().expect("storage lock poisoned");
        revoked.insert(file_id);
        tracing::info!("Revoked signed links for file {}", file_id);
        Ok(())
    }

    async fn is_revoked(&self, file_id: Uuid) -> bool {
        let revoked = self.revoked.read().expect("storage lock poisoned");
        revoked.contains(&file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_then_revoke() {
        let storage = MockFileStorage::new();
        let descriptor = FileDescriptor {
            file_id: Uuid::new_v4(),
            name: "series-001.dcm".into(),
            content_type: "application/dicom".into(),
        };

        let signed = storage.sign_url(&descriptor).await.unwrap();
        assert!(signed.url.contains(&descriptor.file_id.to_string()));
        assert!(signed.expires_at > Utc::now());

        storage.revoke(descriptor.file_id).await.unwrap();
        assert!(storage.sign_url(&descriptor).await.is_err());
    }
}
