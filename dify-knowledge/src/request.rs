//! Request bodies and query parameters for the knowledge base endpoints.
pub use bytes::Bytes;
use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_with::skip_serializing_none;
use std::{collections::HashMap, path::Path};

/// 索引方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingTechnique {
    /// 高质量: 使用 embedding 模型进行嵌入, 构建为向量数据库索引
    HighQuality,
    /// 经济: 使用 keyword table index 的倒排索引进行构建
    #[default]
    Economy,
}

/// 知识库权限
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// 仅自己
    #[default]
    OnlyMe,
    /// 所有团队成员
    AllTeamMembers,
    /// 部分团队成员
    PartialMembers,
}

/// 索引内容的形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocForm {
    /// text 文档直接 embedding
    #[default]
    TextModel,
    /// parent-child 模式
    HierarchicalModel,
    /// Q&A 模式, 为分片文档生成 Q&A 对, 然后对问题进行 embedding
    QaModel,
}

/// 清洗、分段模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    /// 自动
    #[default]
    Automatic,
    /// 自定义
    Custom,
    /// 父子分段
    Hierarchical,
}

/// 处理规则
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessRule {
    /// 清洗、分段模式
    pub mode: ProcessMode,
    /// 自定义规则（自动模式下, 该字段为空）
    pub rules: Option<JsonValue>,
}

/// 检索方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// 混合检索
    HybridSearch,
    /// 语义检索
    SemanticSearch,
    /// 全文检索
    FullTextSearch,
    /// 关键字检索
    KeywordSearch,
}

/// Rerank 模型配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerankingModel {
    /// Rerank 模型的提供商
    pub reranking_provider_name: String,
    /// Rerank 模型的名称
    pub reranking_model_name: String,
}

/// 检索参数
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalModel {
    /// 检索方法
    pub search_method: Option<SearchMethod>,
    /// 是否开启 rerank
    pub reranking_enable: Option<bool>,
    /// Rerank 模型配置
    pub reranking_model: Option<RerankingModel>,
    /// 召回条数
    pub top_k: Option<u32>,
    /// 是否开启召回分数限制
    pub score_threshold_enabled: Option<bool>,
    /// 召回分数限制
    pub score_threshold: Option<f64>,
}

/// 创建空知识库的请求
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetCreateRequest {
    /// 知识库名称（必填）
    pub name: String,
    /// 知识库描述（选填）
    pub description: Option<String>,
    /// 索引模式（选填）
    pub indexing_technique: Option<IndexingTechnique>,
    /// 权限（选填, 默认 only_me）
    pub permission: Option<Permission>,
    /// Provider（选填, 默认 vendor）
    /// * vendor 上传文件
    /// * external 外部知识库
    pub provider: Option<String>,
    /// 外部知识库 API ID（选填）
    pub external_knowledge_api_id: Option<String>,
    /// 外部知识库 ID（选填）
    pub external_knowledge_id: Option<String>,
}

impl DatasetCreateRequest {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            indexing_technique: Some(IndexingTechnique::Economy),
            permission: Some(Permission::OnlyMe),
            provider: Some("vendor".into()),
            ..Default::default()
        }
    }
}

/// 修改知识库详情的请求
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetUpdateRequest {
    /// 知识库名称
    pub name: Option<String>,
    /// 知识库描述
    pub description: Option<String>,
    /// 索引模式
    pub indexing_technique: Option<IndexingTechnique>,
    /// 权限
    pub permission: Option<Permission>,
    /// 嵌入模型
    pub embedding_model: Option<String>,
    /// 嵌入模型供应商
    pub embedding_model_provider: Option<String>,
    /// 检索模式
    pub retrieval_model: Option<RetrievalModel>,
}

/// 检索知识库的请求
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieveRequest {
    /// 检索关键词
    pub query: String,
    /// 检索参数（选填, 如不填, 按照默认方式召回）
    pub retrieval_model: Option<RetrievalModel>,
}

/// 通过文本创建文档的请求
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentCreateByTextRequest {
    /// 文档名称
    pub name: String,
    /// 文档内容
    pub text: String,
    /// 文档类型（选填）
    pub doc_type: Option<String>,
    /// 文档元数据（选填）
    pub doc_metadata: Option<HashMap<String, JsonValue>>,
    /// 索引方式
    pub indexing_technique: Option<IndexingTechnique>,
    /// 索引内容的形式
    pub doc_form: Option<DocForm>,
    /// 在 Q&A 模式下, 指定文档的语言, 例如: English、Chinese
    pub doc_language: Option<String>,
    /// 处理规则
    pub process_rule: Option<ProcessRule>,
    /// 检索模式（首次上传时需要提供）
    pub retrieval_model: Option<RetrievalModel>,
    /// 嵌入模型
    pub embedding_model: Option<String>,
    /// 嵌入模型供应商
    pub embedding_model_provider: Option<String>,
}

impl DocumentCreateByTextRequest {
    pub fn new<N, T>(name: N, text: T) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            text: text.into(),
            indexing_technique: Some(IndexingTechnique::Economy),
            doc_form: Some(DocForm::TextModel),
            doc_language: Some("English".into()),
            process_rule: Some(ProcessRule::default()),
            ..Default::default()
        }
    }
}

/// 通过文本更新文档的请求
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentUpdateByTextRequest {
    /// 文档名称（选填）
    pub name: Option<String>,
    /// 文档内容（选填）
    pub text: Option<String>,
    /// 处理规则（选填）
    pub process_rule: Option<ProcessRule>,
}

/// 通过文件创建文档时的 `data` 部分
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentData {
    /// 源文档 ID（选填）, 用于重新上传文档或修改文档清洗、分段配置
    pub original_document_id: Option<String>,
    /// 索引方式
    pub indexing_technique: Option<IndexingTechnique>,
    /// 索引内容的形式
    pub doc_form: Option<DocForm>,
    /// 文档类型（选填）
    pub doc_type: Option<String>,
    /// 文档元数据（选填）
    pub doc_metadata: Option<HashMap<String, JsonValue>>,
    /// 在 Q&A 模式下, 指定文档的语言
    pub doc_language: Option<String>,
    /// 处理规则
    pub process_rule: Option<ProcessRule>,
}

impl Default for DocumentData {
    fn default() -> Self {
        Self {
            original_document_id: None,
            indexing_technique: Some(IndexingTechnique::Economy),
            doc_form: Some(DocForm::TextModel),
            doc_type: None,
            doc_metadata: None,
            doc_language: Some("English".into()),
            process_rule: Some(ProcessRule::default()),
        }
    }
}

/// 上传的文件
#[derive(Debug, Clone)]
pub struct DocumentFile {
    /// 文件内容
    pub bytes: Bytes,
    /// 文件名, 缺少扩展名时按内容推断补全
    pub file_name: String,
}

impl DocumentFile {
    pub fn new<B, N>(bytes: B, file_name: N) -> Self
    where
        B: Into<Bytes>,
        N: Into<String>,
    {
        Self {
            bytes: bytes.into(),
            file_name: file_name.into(),
        }
    }

    /// Reads a file from disk, named after its last path component.
    pub fn open<P: AsRef<Path>>(path: P) -> AnyResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read upload file: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".into());
        Ok(Self::new(bytes, file_name))
    }
}

/// 通过文件创建文档的请求
#[derive(Debug, Clone)]
pub struct DocumentCreateByFileRequest {
    /// 文档配置
    pub data: DocumentData,
    /// 需要上传的文件
    pub file: DocumentFile,
    /// 检索模式（选填）
    pub retrieval_model: Option<RetrievalModel>,
    /// 嵌入模型（选填）
    pub embedding_model: Option<String>,
    /// 嵌入模型供应商（选填）
    pub embedding_model_provider: Option<String>,
}

impl DocumentCreateByFileRequest {
    pub fn new(file: DocumentFile) -> Self {
        Self {
            data: DocumentData::default(),
            file,
            retrieval_model: None,
            embedding_model: None,
            embedding_model_provider: None,
        }
    }
}

/// 通过文件更新文档时的 `data` 部分
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentUpdateData {
    /// 文档名称（选填）
    pub name: Option<String>,
    /// 处理规则（选填）
    pub process_rule: Option<ProcessRule>,
}

/// 通过文件更新文档的请求
#[derive(Debug, Clone)]
pub struct DocumentUpdateByFileRequest {
    /// 文档配置
    pub data: DocumentUpdateData,
    /// 需要上传的文件
    pub file: DocumentFile,
}

/// 获取文档列表的查询参数
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentListQuery {
    /// 搜索关键词（选填）, 目前仅搜索文档名称
    pub keyword: Option<String>,
    /// 页码（选填）
    pub page: Option<u32>,
    /// 返回条数（选填）, 默认 20, 范围 1-100
    pub limit: Option<u32>,
    /// 文档状态过滤（选填, 仅控制台）
    pub status: Option<String>,
}

/// 新增分段的请求
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentCreateRequest {
    /// 文本内容/问题内容（必填）
    pub content: String,
    /// 答案内容（选填, Q&A 模式下必填）
    pub answer: Option<String>,
    /// 关键字（选填）
    pub keywords: Option<Vec<String>>,
}

impl SegmentCreateRequest {
    pub fn new<C: Into<String>>(content: C) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// 更新分段的请求
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentUpdateRequest {
    /// 文本内容/问题内容
    pub content: Option<String>,
    /// 答案内容（Q&A 模式下必填）
    pub answer: Option<String>,
    /// 关键字
    pub keywords: Option<Vec<String>>,
    /// 是否启用
    pub enabled: Option<bool>,
    /// 是否重新生成子分段
    pub regenerate_child_chunks: Option<bool>,
}

/// 查询分段的参数
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentListQuery {
    /// 搜索关键词（选填）
    pub keyword: Option<String>,
    /// 搜索状态（选填）, 例如 completed
    pub status: Option<String>,
    /// 页码（选填）
    pub page: Option<u32>,
    /// 返回条数（选填）
    pub limit: Option<u32>,
}
