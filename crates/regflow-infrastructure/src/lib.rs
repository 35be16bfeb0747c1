pub mod config_service;
pub mod egress_pool;
pub mod identity_source;
pub mod paths;
pub mod relay_list;
pub mod result_sink;
pub mod storage;

pub use crate::config_service::ConfigService;
pub use crate::egress_pool::EgressPool;
pub use crate::identity_source::{IdentityFactory, IdentityList, ListedIdentity};
pub use crate::relay_list::RelayList;
pub use crate::result_sink::FileResultSink;
