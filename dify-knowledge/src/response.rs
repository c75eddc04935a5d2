//! Records returned by the knowledge base endpoints.
//!
//! Dify adds fields between releases, so every record tolerates missing
//! optional fields and ignores unknown ones.
//!
//! ```
//! use dify_knowledge::response::{DocumentStatus, IndexingStatus};
//!
//! let json = r#"{
//!     "id": "doc-1",
//!     "indexing_status": "indexing",
//!     "completed_segments": 1,
//!     "total_segments": 3
//! }"#;
//! let status: DocumentStatus = serde_json::from_str(json).unwrap();
//!
//! assert_eq!(status.indexing_status, IndexingStatus::Indexing);
//! assert_eq!(status.progress(), 33.33);
//! assert!(!status.is_completed());
//! ```
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 通用结果响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultResponse {
    #[serde(default)]
    pub result: String,
}

/// 知识库
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    /// 知识库 ID
    pub id: String,
    /// 知识库名称
    pub name: String,
    /// 知识库描述
    pub description: Option<String>,
    /// Provider
    pub provider: Option<String>,
    /// 权限
    pub permission: Option<String>,
    /// 数据源类型
    pub data_source_type: Option<String>,
    /// 索引方式
    pub indexing_technique: Option<String>,
    /// 关联应用数
    pub app_count: Option<u64>,
    /// 文档数
    pub document_count: Option<u64>,
    /// 字数
    pub word_count: Option<u64>,
    /// 创建人
    pub created_by: Option<String>,
    /// 创建时间戳
    pub created_at: Option<i64>,
    /// 更新人
    pub updated_by: Option<String>,
    /// 更新时间戳
    pub updated_at: Option<i64>,
    /// 嵌入模型
    pub embedding_model: Option<String>,
    /// 嵌入模型供应商
    pub embedding_model_provider: Option<String>,
    /// 嵌入模型是否可用
    pub embedding_available: Option<bool>,
    /// 检索配置
    pub retrieval_model_dict: Option<JsonValue>,
    /// 标签
    pub tags: Vec<JsonValue>,
    /// 索引内容的形式
    pub doc_form: Option<String>,
    /// 外部知识库信息
    pub external_knowledge_info: Option<JsonValue>,
    /// 外部知识库检索配置
    pub external_retrieval_model: Option<JsonValue>,
}

/// 文档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    /// 文档 ID
    pub id: String,
    /// 位置
    pub position: Option<u32>,
    /// 数据源类型
    pub data_source_type: Option<String>,
    /// 数据源信息
    pub data_source_info: Option<JsonValue>,
    /// 数据源详情
    pub data_source_detail_dict: Option<JsonValue>,
    /// 处理规则 ID
    pub dataset_process_rule_id: Option<String>,
    /// 文档名称
    pub name: String,
    /// 创建来源
    pub created_from: Option<String>,
    /// 创建人
    pub created_by: Option<String>,
    /// 创建时间戳
    pub created_at: Option<i64>,
    /// token 数
    pub tokens: Option<u64>,
    /// 索引状态
    pub indexing_status: Option<IndexingStatus>,
    /// 错误信息
    pub error: Option<String>,
    /// 是否启用
    pub enabled: Option<bool>,
    /// 禁用时间戳
    pub disabled_at: Option<i64>,
    /// 禁用人
    pub disabled_by: Option<String>,
    /// 是否归档
    pub archived: Option<bool>,
    /// 展示状态
    pub display_status: Option<String>,
    /// 字数
    pub word_count: Option<u64>,
    /// 命中次数
    pub hit_count: Option<u64>,
    /// 索引内容的形式
    pub doc_form: Option<String>,
}

/// 创建/更新文档的响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentCreateResponse {
    /// 文档
    pub document: Document,
    /// 批次号, 用于查询索引进度
    #[serde(default)]
    pub batch: String,
}

/// 索引状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    Waiting,
    Parsing,
    Cleaning,
    Splitting,
    Indexing,
    Paused,
    Error,
    Completed,
    /// 未识别的状态
    #[serde(other)]
    Unknown,
}

/// 文档嵌入状态（进度）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStatus {
    /// 文档 ID
    pub id: String,
    /// 索引状态
    pub indexing_status: IndexingStatus,
    /// 开始处理时间
    #[serde(default)]
    pub processing_started_at: Option<f64>,
    /// 解析完成时间
    #[serde(default)]
    pub parsing_completed_at: Option<f64>,
    /// 清洗完成时间
    #[serde(default)]
    pub cleaning_completed_at: Option<f64>,
    /// 分段完成时间
    #[serde(default)]
    pub splitting_completed_at: Option<f64>,
    /// 完成时间
    #[serde(default)]
    pub completed_at: Option<f64>,
    /// 暂停时间
    #[serde(default)]
    pub paused_at: Option<f64>,
    /// 错误信息
    #[serde(default)]
    pub error: Option<String>,
    /// 停止时间
    #[serde(default)]
    pub stopped_at: Option<f64>,
    /// 已完成分段数
    #[serde(default)]
    pub completed_segments: u64,
    /// 总分段数
    #[serde(default)]
    pub total_segments: u64,
}

impl DocumentStatus {
    pub fn is_completed(&self) -> bool {
        self.indexing_status == IndexingStatus::Completed
    }

    pub fn has_error(&self) -> bool {
        self.indexing_status == IndexingStatus::Error || self.error.is_some()
    }

    /// Completed segments as a percentage, rounded to two decimals.
    pub fn progress(&self) -> f64 {
        if self.total_segments == 0 {
            return 0.0;
        }
        let percent = self.completed_segments as f64 / self.total_segments as f64 * 100.0;
        (percent * 100.0).round() / 100.0
    }
}

/// 文档嵌入状态列表响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStatusResponse {
    #[serde(default)]
    pub data: Vec<DocumentStatus>,
}

/// 上传文件详情
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadFile {
    /// 文件 ID
    pub id: String,
    /// 文件名
    pub name: String,
    /// 文件大小
    pub size: u64,
    /// 扩展名
    pub extension: String,
    /// 预览地址
    pub url: String,
    /// 下载地址
    pub download_url: String,
    /// MIME 类型
    pub mime_type: String,
    /// 上传人
    pub created_by: String,
    /// 上传时间戳
    pub created_at: i64,
}

/// 分段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Segment {
    /// 分段 ID
    pub id: String,
    /// 位置
    pub position: Option<u32>,
    /// 文档 ID
    pub document_id: Option<String>,
    /// 文本内容/问题内容
    pub content: String,
    /// 答案内容
    pub answer: Option<String>,
    /// 字数
    pub word_count: Option<u64>,
    /// token 数
    pub tokens: Option<u64>,
    /// 关键字
    pub keywords: Vec<String>,
    /// 索引节点 ID
    pub index_node_id: Option<String>,
    /// 索引节点哈希
    pub index_node_hash: Option<String>,
    /// 命中次数
    pub hit_count: Option<u64>,
    /// 是否启用
    pub enabled: Option<bool>,
    /// 禁用时间戳
    pub disabled_at: Option<i64>,
    /// 禁用人
    pub disabled_by: Option<String>,
    /// 状态
    pub status: Option<String>,
    /// 创建人
    pub created_by: Option<String>,
    /// 创建时间戳
    pub created_at: Option<i64>,
    /// 开始索引时间戳
    pub indexing_at: Option<i64>,
    /// 完成时间戳
    pub completed_at: Option<i64>,
    /// 错误信息
    pub error: Option<String>,
    /// 停止时间戳
    pub stopped_at: Option<i64>,
}

/// 分段列表响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentsResponse {
    #[serde(default)]
    pub data: Vec<Segment>,
    /// 索引内容的形式
    #[serde(default)]
    pub doc_form: Option<String>,
}

/// 单个分段响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentResponse {
    pub data: Segment,
    /// 索引内容的形式
    #[serde(default)]
    pub doc_form: Option<String>,
}

/// 检索的查询
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieveQuery {
    /// 查询内容
    #[serde(default)]
    pub content: String,
}

/// 检索命中的分段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieveRecord {
    /// 分段
    pub segment: Segment,
    /// 相关度
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub tsne_position: Option<JsonValue>,
}

/// 检索知识库的响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieveResponse {
    /// 查询
    #[serde(default)]
    pub query: RetrieveQuery,
    /// 命中的分段
    #[serde(default)]
    pub records: Vec<RetrieveRecord>,
}

/// 分页信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginator {
    /// 当前页码
    pub page: u32,
    /// 每页条数
    pub limit: u32,
    /// 总条数
    pub total: u64,
    /// 是否还有下一页
    pub has_more: bool,
}

impl Paginator {
    /// A paginator whose `has_more` is derived from `total`.
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            has_more: u64::from(page) * u64::from(limit) < total,
        }
    }
}

/// 分页列表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// 当前页数据
    pub data: Vec<T>,
    /// 分页信息
    pub paginator: Paginator,
}

impl<T> Paginated<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }
}

impl<T> IntoIterator for Paginated<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

/// A raw Dify list page, before it is turned into a [`Paginated`].
#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub(crate) struct PageResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

impl<T> PageResponse<T> {
    /// Fills whatever the server left out from the request that produced the page.
    pub fn into_paginated(self, page: u32, limit: u32) -> Paginated<T> {
        let page = self.page.unwrap_or(page);
        let limit = self.limit.unwrap_or(limit);
        let total = self.total.unwrap_or(self.data.len() as u64);
        let mut paginator = Paginator::new(page, limit, total);
        if let Some(has_more) = self.has_more {
            paginator.has_more = has_more;
        }
        Paginated {
            data: self.data,
            paginator,
        }
    }
}
