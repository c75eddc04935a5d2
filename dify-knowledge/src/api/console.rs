use super::{Datasets, Documents, Segments};
use crate::{error::Result, session::Session, token::LoginResponse};

/// The administrative API, reached with a console login instead of an API key.
///
/// Obtained from [`Client::console`](crate::Client::console).
#[derive(Debug, Clone, Copy)]
pub struct Console<'a> {
    session: &'a Session,
}

impl<'a> Console<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// 控制台登录
    ///
    /// Requests log in on their own when needed; calling this is only useful to
    /// fail early on bad credentials.
    pub async fn login(&self) -> Result<LoginResponse> {
        self.session.login().await
    }

    pub fn datasets(&self) -> Datasets<'a> {
        Datasets::new(self.session)
    }

    pub fn documents(&self) -> Documents<'a> {
        Documents::new(self.session)
    }

    pub fn segments(&self) -> Segments<'a> {
        Segments::new(self.session)
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }
}
