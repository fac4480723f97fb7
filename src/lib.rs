//! rat_vercache - 版本化对象缓存库
//!
//! 在关系型数据访问层与远程KV缓存服务之间提供透明的读加速：
//! 整条记录按 `(前缀, id, 版本)` 缓存，二级键/列表查询只缓存
//! 主键并经对象缓存取回记录；记录变更时不直接删除查询缓存，
//! 而是推进版本计数器使旧键不可达。另提供进程内防穿透代理，
//! 将并发的相同调用折叠为一次回源
//!
//! ```no_run
//! use rat_vercache::{initialize_cache, CacheConfig, MemoryKvClient};
//! use std::sync::Arc;
//!
//! # fn main() -> rat_vercache::CacheResult<()> {
//! let ctx = initialize_cache(Arc::new(MemoryKvClient::new()), CacheConfig::default())?;
//! # let _ = ctx;
//! # Ok(())
//! # }
//! ```

// 导出所有公共模块
pub mod codec;
pub mod config;
pub mod context;
pub mod dao;
pub mod error;
pub mod keys;
pub mod kv;
pub mod meta;
pub mod method;
pub mod penetrate;
pub mod record;
pub mod types;
pub mod version;

// 重新导出常用类型和函数
pub use codec::{JsonSerializer, Serializer};
pub use config::{CacheConfig, CacheConfigBuilder, DEFAULT_EXPIRE_SECS, DEFAULT_MEMO_CAPACITY};
pub use context::{current_context, initialize_cache, register_dao, CacheContext, DaoInitFn};
pub use dao::{CacheDao, CacheDaoBuilder, RecordSource};
pub use error::{CacheError, CacheResult};
pub use keys::KeyBuilder;
pub use kv::{KvClient, KvError, KvResult, MemoryKvClient};
pub use meta::{EntityMeta, NotifyInfo, NotifyTag};
pub use method::{MethodFuture, MethodHandle};
pub use penetrate::AntiPenetrate;
pub use record::CacheRecord;
pub use types::{ArgValue, NotifyType, QueryMode};
pub use version::VersionStore;
