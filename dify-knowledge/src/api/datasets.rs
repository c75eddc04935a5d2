use super::ApiPath;
use crate::{
    error::{Error, Result},
    request::{DatasetCreateRequest, DatasetUpdateRequest, RetrieveRequest},
    response::{Dataset, PageResponse, Paginated, RetrieveResponse},
    session::Session,
};
use serde_json::Value as JsonValue;

/// 知识库
#[derive(Debug, Clone, Copy)]
pub struct Datasets<'a> {
    session: &'a Session,
}

impl<'a> Datasets<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// 创建空知识库
    pub async fn create(&self, req: DatasetCreateRequest) -> Result<Dataset> {
        if req.name.trim().is_empty() {
            return Err(Error::InvalidRequest("dataset name must not be empty".into()));
        }
        self.session.post(ApiPath::Datasets.as_str(), &req).await
    }

    /// 知识库列表
    pub async fn list(&self, page: u32, limit: u32) -> Result<Paginated<Dataset>> {
        let query = vec![
            ("page".to_string(), page.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        let raw: PageResponse<Dataset> =
            self.session.get(ApiPath::Datasets.as_str(), &query).await?;
        Ok(raw.into_paginated(page, limit))
    }

    /// 知识库详情
    pub async fn get(&self, dataset_id: &str) -> Result<Dataset> {
        let path = ApiPath::Dataset.with(&[("dataset_id", dataset_id)])?;
        self.session.get(&path, &[]).await
    }

    /// 修改知识库详情
    pub async fn update(&self, dataset_id: &str, req: DatasetUpdateRequest) -> Result<Dataset> {
        let path = ApiPath::Dataset.with(&[("dataset_id", dataset_id)])?;
        self.session.patch(&path, &req).await
    }

    /// 删除知识库
    pub async fn delete(&self, dataset_id: &str) -> Result<()> {
        let path = ApiPath::Dataset.with(&[("dataset_id", dataset_id)])?;
        self.session.delete::<JsonValue>(&path).await?;
        Ok(())
    }

    /// 检索知识库
    pub async fn retrieve(&self, dataset_id: &str, req: RetrieveRequest) -> Result<RetrieveResponse> {
        let path = ApiPath::DatasetRetrieve.with(&[("dataset_id", dataset_id)])?;
        if req.query.trim().is_empty() {
            return Err(Error::InvalidRequest("retrieve query must not be empty".into()));
        }
        self.session.post(&path, &req).await
    }
}
