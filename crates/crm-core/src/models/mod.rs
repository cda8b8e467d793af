//! 数据模型定义

mod bonus;
mod client;
mod document;
mod enums;
mod event_log;
mod extension;
mod notification;
mod platform;
mod profit_share;
mod todo;
mod user;

pub use bonus::*;
pub use client::*;
pub use document::*;
pub use enums::*;
pub use event_log::*;
pub use extension::*;
pub use notification::*;
pub use platform::*;
pub use profit_share::*;
pub use todo::*;
pub use user::*;

use serde::Serialize;

/// 分页窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub offset: i64,
    pub limit: i64,
}

impl Paging {
    pub const MAX_LIMIT: i64 = 100;

    /// 由 1 起始的页码构造，page_size 限制在 1..=100
    ///
    /// 超大页码的偏移量饱和到 `i64::MAX`，查询结果为空页。
    pub fn new(page: i64, page_size: i64) -> Self {
        let limit = page_size.clamp(1, Self::MAX_LIMIT);
        let page = page.max(1);
        Self {
            offset: (page - 1).saturating_mul(limit),
            limit,
        }
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// 一页数据及总数
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64) -> Self {
        Self { items, total }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}
