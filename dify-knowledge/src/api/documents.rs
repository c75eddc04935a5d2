use super::{query_pairs, ApiPath, DEFAULT_LIMIT, DEFAULT_PAGE};
use crate::{
    error::{Error, Result},
    http::{FormPart, Method, RequestBody},
    request::{
        DocumentCreateByFileRequest, DocumentCreateByTextRequest, DocumentFile,
        DocumentListQuery, DocumentUpdateByFileRequest, DocumentUpdateByTextRequest,
    },
    response::{
        Document, DocumentCreateResponse, DocumentStatus, DocumentStatusResponse, PageResponse,
        Paginated, ResultResponse, UploadFile,
    },
    session::{AuthMode, Session},
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::path::Path;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// 文档
#[derive(Debug, Clone, Copy)]
pub struct Documents<'a> {
    session: &'a Session,
}

impl<'a> Documents<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// 通过文本创建文档
    pub async fn create_by_text(
        &self,
        dataset_id: &str,
        req: DocumentCreateByTextRequest,
    ) -> Result<DocumentCreateResponse> {
        let path = ApiPath::DocumentCreateByText.with(&[("dataset_id", dataset_id)])?;
        if req.name.trim().is_empty() {
            return Err(Error::InvalidRequest("document name must not be empty".into()));
        }
        if req.text.is_empty() {
            return Err(Error::InvalidRequest("document text must not be empty".into()));
        }
        self.session.post(&path, &req).await
    }

    /// 通过文件创建文档
    ///
    /// 文件以 multipart 上传, `data` 部分为 JSON 格式的文档配置。
    pub async fn create_by_file(
        &self,
        dataset_id: &str,
        req: DocumentCreateByFileRequest,
    ) -> Result<DocumentCreateResponse> {
        let path = ApiPath::DocumentCreateByFile.with(&[("dataset_id", dataset_id)])?;
        let mut parts = vec![json_part("data", &req.data)?, file_part(req.file)?];
        if let Some(retrieval_model) = &req.retrieval_model {
            parts.push(json_part("retrieval_model", retrieval_model)?);
        }
        if let Some(embedding_model) = req.embedding_model {
            parts.push(FormPart::text("embedding_model", embedding_model));
        }
        if let Some(provider) = req.embedding_model_provider {
            parts.push(FormPart::text("embedding_model_provider", provider));
        }
        self.session.upload(&path, parts).await
    }

    /// 通过文本更新文档
    pub async fn update_by_text(
        &self,
        dataset_id: &str,
        document_id: &str,
        req: DocumentUpdateByTextRequest,
    ) -> Result<DocumentCreateResponse> {
        let path = ApiPath::DocumentUpdateByText
            .with(&[("dataset_id", dataset_id), ("document_id", document_id)])?;
        self.session.post(&path, &req).await
    }

    /// 通过文件更新文档
    pub async fn update_by_file(
        &self,
        dataset_id: &str,
        document_id: &str,
        req: DocumentUpdateByFileRequest,
    ) -> Result<DocumentCreateResponse> {
        let path = ApiPath::DocumentUpdateByFile
            .with(&[("dataset_id", dataset_id), ("document_id", document_id)])?;
        let parts = vec![json_part("data", &req.data)?, file_part(req.file)?];
        self.session.upload(&path, parts).await
    }

    /// 知识库文档列表
    pub async fn list(
        &self,
        dataset_id: &str,
        query: DocumentListQuery,
    ) -> Result<Paginated<Document>> {
        let path = ApiPath::Documents.with(&[("dataset_id", dataset_id)])?;
        let page = query.page.unwrap_or(DEFAULT_PAGE);
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
        let raw: PageResponse<Document> = self.session.get(&path, &query_pairs(&query)?).await?;
        Ok(raw.into_paginated(page, limit))
    }

    /// 删除文档
    pub async fn delete(&self, dataset_id: &str, document_id: &str) -> Result<()> {
        let path =
            ApiPath::Document.with(&[("dataset_id", dataset_id), ("document_id", document_id)])?;
        self.session
            .delete::<JsonValue>(&path)
            .await
            .map_err(Error::or_not_found)?;
        Ok(())
    }

    /// 获取文档嵌入状态（进度）
    pub async fn indexing_status(
        &self,
        dataset_id: &str,
        batch: &str,
    ) -> Result<Vec<DocumentStatus>> {
        let path = ApiPath::DocumentIndexingStatus
            .with(&[("dataset_id", dataset_id), ("batch", batch)])?;
        let resp: DocumentStatusResponse = self.session.get(&path, &[]).await?;
        Ok(resp.data)
    }

    /// 获取文档的上传文件
    pub async fn upload_file(&self, dataset_id: &str, document_id: &str) -> Result<UploadFile> {
        let path = ApiPath::DocumentUploadFile
            .with(&[("dataset_id", dataset_id), ("document_id", document_id)])?;
        self.session.get(&path, &[]).await
    }

    /// 文档详情（仅控制台）
    pub async fn get(&self, dataset_id: &str, document_id: &str) -> Result<Document> {
        self.require_console("document details")?;
        let path =
            ApiPath::Document.with(&[("dataset_id", dataset_id), ("document_id", document_id)])?;
        self.session.get(&path, &[]).await
    }

    /// 批量启用文档（仅控制台）
    pub async fn enable(&self, dataset_id: &str, document_ids: &[&str]) -> Result<ResultResponse> {
        self.set_status(ApiPath::DocumentsEnable, dataset_id, document_ids)
            .await
    }

    /// 批量禁用文档（仅控制台）
    pub async fn disable(&self, dataset_id: &str, document_ids: &[&str]) -> Result<ResultResponse> {
        self.set_status(ApiPath::DocumentsDisable, dataset_id, document_ids)
            .await
    }

    async fn set_status(
        &self,
        api_path: ApiPath,
        dataset_id: &str,
        document_ids: &[&str],
    ) -> Result<ResultResponse> {
        self.require_console("document status changes")?;
        let path = api_path.with(&[("dataset_id", dataset_id)])?;
        if document_ids.is_empty() || document_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(Error::InvalidRequest("document ids must not be empty".into()));
        }
        let query = vec![("document_id".to_string(), document_ids.join(","))];
        self.session
            .request(Method::PATCH, &path, &query, RequestBody::Empty)
            .await
    }

    fn require_console(&self, what: &str) -> Result<()> {
        match self.session.mode() {
            AuthMode::Login { .. } => Ok(()),
            AuthMode::ApiKey(_) => Err(Error::NotConfigured(format!(
                "{} are only available through the console",
                what
            ))),
        }
    }
}

fn json_part<T: Serialize>(name: &str, value: &T) -> Result<FormPart> {
    let value = serde_json::to_value(value).map_err(|e| Error::InvalidRequest(e.to_string()))?;
    Ok(FormPart::json(name, &value))
}

/// Builds the `file` part; the mime type is sniffed from the content and the
/// sniffed extension is appended to names that have none.
fn file_part(file: DocumentFile) -> Result<FormPart> {
    if file.bytes.is_empty() {
        return Err(Error::InvalidRequest("upload file must not be empty".into()));
    }
    let kind = infer::get(&file.bytes);
    let mut file_name = file.file_name.trim().to_string();
    if file_name.is_empty() {
        file_name = "file".into();
    }
    let extension = Path::new(&file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    if extension.is_none() {
        if let Some(kind) = kind {
            file_name = format!("{}.{}", file_name, kind.extension());
        }
    }
    let mime_type = match kind {
        Some(kind) => kind.mime_type(),
        None => text_mime_type(extension.as_deref()),
    };
    Ok(FormPart::file("file", file.bytes, file_name, mime_type))
}

/// Mime type by extension, for content `infer` does not recognize.
fn text_mime_type(extension: Option<&str>) -> &'static str {
    match extension {
        Some("txt") => "text/plain",
        Some("md" | "markdown" | "mdx") => "text/markdown",
        Some("csv") => "text/csv",
        Some("htm" | "html") => "text/html",
        Some("json") => "application/json",
        _ => FALLBACK_MIME_TYPE,
    }
}
