use super::{query_pairs, ApiPath};
use crate::{
    error::{Error, Result},
    request::{SegmentCreateRequest, SegmentListQuery, SegmentUpdateRequest},
    response::{SegmentResponse, SegmentsResponse},
    session::Session,
};
use serde_json::{json, Value as JsonValue};

/// 分段
#[derive(Debug, Clone, Copy)]
pub struct Segments<'a> {
    session: &'a Session,
}

impl<'a> Segments<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// 新增分段
    pub async fn create(
        &self,
        dataset_id: &str,
        document_id: &str,
        segments: Vec<SegmentCreateRequest>,
    ) -> Result<SegmentsResponse> {
        let path = ApiPath::Segments
            .with(&[("dataset_id", dataset_id), ("document_id", document_id)])?;
        if segments.is_empty() {
            return Err(Error::InvalidRequest("segments must not be empty".into()));
        }
        if segments.iter().any(|s| s.content.trim().is_empty()) {
            return Err(Error::InvalidRequest("segment content must not be empty".into()));
        }
        self.session
            .post(&path, &json!({ "segments": segments }))
            .await
    }

    /// 查询文档分段
    pub async fn list(
        &self,
        dataset_id: &str,
        document_id: &str,
        query: SegmentListQuery,
    ) -> Result<SegmentsResponse> {
        let path = ApiPath::Segments
            .with(&[("dataset_id", dataset_id), ("document_id", document_id)])?;
        self.session.get(&path, &query_pairs(&query)?).await
    }

    /// 更新文档分段
    pub async fn update(
        &self,
        dataset_id: &str,
        document_id: &str,
        segment_id: &str,
        req: SegmentUpdateRequest,
    ) -> Result<SegmentResponse> {
        let path = ApiPath::Segment.with(&[
            ("dataset_id", dataset_id),
            ("document_id", document_id),
            ("segment_id", segment_id),
        ])?;
        self.session.post(&path, &json!({ "segment": req })).await
    }

    /// 删除文档分段
    pub async fn delete(&self, dataset_id: &str, document_id: &str, segment_id: &str) -> Result<()> {
        let path = ApiPath::Segment.with(&[
            ("dataset_id", dataset_id),
            ("document_id", document_id),
            ("segment_id", segment_id),
        ])?;
        self.session.delete::<JsonValue>(&path).await?;
        Ok(())
    }
}
