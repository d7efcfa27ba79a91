// ==========================================
// ERP 导入连接器 - 远程接口层
// ==========================================
// 职责: 访问外部 ERP 数据对象 (IDO) 接口
// 支持: HTTP (IdoClient), 离线 JSON (FixtureRemote)
// ==========================================

pub mod client;
pub mod error;
pub mod fixture_client;
pub mod ido_client;
pub mod paging;
pub mod retry;

pub use client::{
    CollectionQuery, FieldType, ObjectSchema, RemoteClient, RemotePage, RemoteRow, SchemaField,
};
pub use error::{RemoteError, RemoteResult};
pub use fixture_client::FixtureRemote;
pub use ido_client::{IdoClient, IdoClientConfig};
pub use paging::{fetch_collection, PageStream};
pub use retry::{RetryPolicy, Retrying};
