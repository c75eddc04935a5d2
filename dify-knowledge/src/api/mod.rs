//! Typed wrappers around the knowledge base endpoints.
//!
//! Each wrapper borrows a [`Session`](crate::session::Session) and only builds
//! paths, bodies and queries; authentication and retries stay in the session.
//! The same wrappers serve the public API (`/v1`) and the console API
//! (`/console/api`), the session decides which prefix is used.
//!
//! # Example
//!
//! ```no_run
//! use dify_knowledge::request::DatasetCreateRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = dify_knowledge::Client::new("https://api.dify.ai", "DATASET_API_KEY")?;
//!
//!     let dataset = client
//!         .datasets()
//!         .create(DatasetCreateRequest::new("TEST_abc"))
//!         .await?;
//!     println!("created dataset {}", dataset.id);
//!
//!     let page = client.datasets().list(1, 20).await?;
//!     for dataset in page.iter() {
//!         println!("{} {}", dataset.id, dataset.name);
//!     }
//!
//!     client.datasets().delete(&dataset.id).await?;
//!     Ok(())
//! }
//! ```
mod console;
mod datasets;
mod documents;
mod segments;

pub use self::console::Console;
pub use self::datasets::Datasets;
pub use self::documents::Documents;
pub use self::segments::Segments;

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Page requested when the caller does not pick one.
pub const DEFAULT_PAGE: u32 = 1;
/// Page size requested when the caller does not pick one.
pub const DEFAULT_LIMIT: u32 = 20;

/// API 路径, 相对于 `/v1` 或 `/console/api`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiPath {
    /// 控制台登录
    Login,
    /// 刷新访问令牌
    RefreshToken,
    /// 知识库列表 / 创建空知识库
    Datasets,
    /// 知识库详情 / 修改 / 删除
    Dataset,
    /// 检索知识库
    DatasetRetrieve,
    /// 通过文本创建文档
    DocumentCreateByText,
    /// 通过文件创建文档
    DocumentCreateByFile,
    /// 知识库文档列表
    Documents,
    /// 文档详情 / 删除文档
    Document,
    /// 通过文本更新文档
    DocumentUpdateByText,
    /// 通过文件更新文档
    DocumentUpdateByFile,
    /// 获取文档嵌入状态（进度）
    DocumentIndexingStatus,
    /// 获取上传文件
    DocumentUploadFile,
    /// 批量启用文档（仅控制台）
    DocumentsEnable,
    /// 批量禁用文档（仅控制台）
    DocumentsDisable,
    /// 分段列表 / 新增分段
    Segments,
    /// 更新 / 删除分段
    Segment,
}

impl ApiPath {
    /// 获取 API 路径
    /// # Example
    /// ```
    /// use dify_knowledge::api::ApiPath;
    /// let path = ApiPath::Dataset;
    /// assert_eq!(path.as_str(), "/datasets/{dataset_id}");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiPath::Login => "/login",
            ApiPath::RefreshToken => "/oauth/token/refresh",
            ApiPath::Datasets => "/datasets",
            ApiPath::Dataset => "/datasets/{dataset_id}",
            ApiPath::DatasetRetrieve => "/datasets/{dataset_id}/retrieve",
            ApiPath::DocumentCreateByText => "/datasets/{dataset_id}/document/create-by-text",
            ApiPath::DocumentCreateByFile => "/datasets/{dataset_id}/document/create-by-file",
            ApiPath::Documents => "/datasets/{dataset_id}/documents",
            ApiPath::Document => "/datasets/{dataset_id}/documents/{document_id}",
            ApiPath::DocumentUpdateByText => {
                "/datasets/{dataset_id}/documents/{document_id}/update-by-text"
            }
            ApiPath::DocumentUpdateByFile => {
                "/datasets/{dataset_id}/documents/{document_id}/update-by-file"
            }
            ApiPath::DocumentIndexingStatus => {
                "/datasets/{dataset_id}/documents/{batch}/indexing-status"
            }
            ApiPath::DocumentUploadFile => {
                "/datasets/{dataset_id}/documents/{document_id}/upload-file"
            }
            ApiPath::DocumentsEnable => "/datasets/{dataset_id}/documents/status/enable/batch",
            ApiPath::DocumentsDisable => "/datasets/{dataset_id}/documents/status/disable/batch",
            ApiPath::Segments => "/datasets/{dataset_id}/documents/{document_id}/segments",
            ApiPath::Segment => {
                "/datasets/{dataset_id}/documents/{document_id}/segments/{segment_id}"
            }
        }
    }

    /// Substitutes `{name}` placeholders. Empty values are rejected before any
    /// request is made.
    ///
    /// ```
    /// use dify_knowledge::api::ApiPath;
    ///
    /// let path = ApiPath::Document
    ///     .with(&[("dataset_id", "ds"), ("document_id", "doc")])
    ///     .unwrap();
    /// assert_eq!(path, "/datasets/ds/documents/doc");
    /// assert!(ApiPath::Dataset.with(&[("dataset_id", "")]).is_err());
    /// ```
    pub fn with(&self, params: &[(&str, &str)]) -> Result<String> {
        let mut path = self.as_str().to_string();
        for (name, value) in params {
            if value.trim().is_empty() {
                return Err(Error::InvalidRequest(format!("{} must not be empty", name)));
            }
            path = path.replace(&format!("{{{}}}", name), value);
        }
        Ok(path)
    }
}

impl Display for ApiPath {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Flattens a query struct into string pairs, dropping `null` fields.
pub(crate) fn query_pairs<T: Serialize>(query: &T) -> Result<Vec<(String, String)>> {
    let value =
        serde_json::to_value(query).map_err(|e| Error::InvalidRequest(e.to_string()))?;
    let JsonValue::Object(fields) = value else {
        return Err(Error::InvalidRequest("query must be a struct".into()));
    };
    Ok(fields
        .into_iter()
        .filter_map(|(key, value)| match value {
            JsonValue::Null => None,
            JsonValue::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}
