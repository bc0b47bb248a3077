//! HTTP request handlers, one module per resource.

pub mod analyses;
pub mod auth;
pub mod exports;
pub mod health;
pub mod statements;

use serde::{Deserialize, Serialize};

use finsight_core::defaults::{PAGE_SIZE, PAGE_SIZE_MAX};

/// `page`/`size` query parameters shared by every list endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl PageParams {
    /// Convert 1-based page/size into limit/offset, clamping size to
    /// `[1, PAGE_SIZE_MAX]`.
    pub fn limit_offset(&self) -> (i64, i64) {
        let size = self.size.unwrap_or(PAGE_SIZE).clamp(1, PAGE_SIZE_MAX);
        let page = self.page.unwrap_or(1).max(1);
        (size, (page - 1) * size)
    }
}

/// Standard paginated list envelope.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl PaginationMeta {
    pub fn new(total: i64, limit: i64, offset: i64) -> Self {
        Self {
            total,
            limit,
            offset,
            has_more: offset + limit < total,
        }
    }
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(total, limit, offset),
        }
    }
}
