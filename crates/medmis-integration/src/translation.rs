//! 翻译存储
//!
//! 面向患者的文案按语言分表存放，核心只做键值查询。
//! 缺失条目回退到英文，再缺失则原样返回键名。

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// 支持的界面语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ru,
    Uz,
    Kk,
}

/// 翻译查询接口
pub trait TranslationStore: Send + Sync {
    /// 按语言查键值，带英文回退
    fn lookup(&self, lang: Language, key: &str) -> String;
}

/// 内存翻译表
#[derive(Debug, Default)]
pub struct InMemoryTranslationStore {
    tables: RwLock<HashMap<Language, HashMap<String, String>>>,
}

impl InMemoryTranslationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, lang: Language, key: &str, value: &str) {
        let mut tables = self.tables.write().expect("translation lock poisoned");
        tables
            .entry(lang)
            .or_default()
            .insert(key.to_string(), value.to_string());
    }
}

impl TranslationStore for InMemoryTranslationStore {
    fn lookup(&self, lang: Language, key: &str) -> String {
        let tables = self.tables.read().expect("translation lock poisoned");
        if let Some(value) = tables.get(&lang).and_then(|t| t.get(key)) {
            return value.clone();
        }
        if let Some(value) = tables.get(&Language::En).and_then(|t| t.get(key)) {
            return value.clone();
        }
        key.to_string()
    }
}
