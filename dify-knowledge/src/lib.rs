//! Dify knowledge base client library.
//!
//! Typed access to datasets, documents and segments, through either the public
//! API (dataset API key) or the console API (email and password login with
//! cached, automatically refreshed tokens).
//!
//! # Examples
//!
//! ## Public API with a dataset api key
//!
//! ```no_run
//! use dify_knowledge::{request, Client};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::new("https://api.dify.ai", "DATASET_API_KEY")?;
//!
//!     let dataset = client
//!         .datasets()
//!         .create(request::DatasetCreateRequest::new("TEST_abc"))
//!         .await?;
//!     let created = client
//!         .documents()
//!         .create_by_text(
//!             &dataset.id,
//!             request::DocumentCreateByTextRequest::new("notes", "Dify is an LLM app platform."),
//!         )
//!         .await?;
//!     let status = client
//!         .documents()
//!         .indexing_status(&dataset.id, &created.batch)
//!         .await?;
//!     println!("{:?}", status);
//!     Ok(())
//! }
//! ```
//!
//! ## Console API
//!
//! The console session logs in on demand. When the access token expires, the
//! next request that gets a 401 refreshes it (or logs in again) and is replayed
//! once.
//!
//! ```no_run
//! use dify_knowledge::{error::ErrorKind, Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // DIFY_BASE_URL, DIFY_CONSOLE_EMAIL, DIFY_CONSOLE_PASSWORD, DIFY_CACHE_DRIVER, ...
//!     let client = Client::new_with_config(Config::from_env()?).await?;
//!     let console = client.console()?;
//!
//!     match console.documents().get("dataset-id", "document-id").await {
//!         Ok(document) => println!("{:?}", document),
//!         Err(e) if e.kind() == ErrorKind::NotFound => println!("no such document"),
//!         Err(e) => return Err(e.into()),
//!     }
//!     console.documents().disable("dataset-id", &["document-id"]).await?;
//!     Ok(())
//! }
//! ```
//! For all endpoint methods, refer to the [`api`] module.

pub mod api;
pub mod cache;
pub mod client;
pub mod error;
pub mod http;
pub mod request;
pub mod response;
pub mod session;
pub mod token;

pub use client::*;
pub use error::{Error, ErrorKind};
