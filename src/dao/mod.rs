//! 缓存DAO模块
//!
//! 将实体元数据、对象缓存、查询缓存与失效路由粘合为统一的
//! 读写入口。每个实体在进程启动阶段构建一个 `CacheDao` 并
//! 完成一次性初始化校验

mod notify;
mod object;
mod query;

use crate::codec::{JsonSerializer, Serializer};
use crate::context::CacheContext;
use crate::error::{CacheError, CacheResult};
use crate::keys::KeyBuilder;
use crate::method::MethodHandle;
use crate::meta::EntityMeta;
use crate::record::CacheRecord;
use crate::version::VersionStore;
use async_trait::async_trait;
use dashmap::DashMap;
use rat_logger::{info, warn};
use std::sync::Arc;

/// 按主键回源的数据源契约（SQL层）
///
/// 记录不存在不是错误，以 `None`/缺席表示
#[async_trait]
pub trait RecordSource<R>: Send + Sync
where
    R: CacheRecord,
{
    /// 按主键读取单条记录
    async fn get_by_id(&self, id: u64) -> CacheResult<Option<R>>;

    /// 按主键批量读取，结果数量可少于请求数量
    async fn get_by_ids(&self, ids: &[u64]) -> CacheResult<Vec<R>>;
}

/// 实体级缓存DAO
pub struct CacheDao<R: CacheRecord> {
    pub(crate) ctx: Arc<CacheContext>,
    pub(crate) meta: Arc<EntityMeta>,
    pub(crate) keys: KeyBuilder,
    pub(crate) versions: VersionStore,
    pub(crate) serializer: Arc<dyn Serializer<R>>,
    pub(crate) source: Arc<dyn RecordSource<R>>,
    pub(crate) methods: Arc<DashMap<String, MethodHandle<R>>>,
}

impl<R: CacheRecord> Clone for CacheDao<R> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            meta: self.meta.clone(),
            keys: self.keys.clone(),
            versions: self.versions.clone(),
            serializer: self.serializer.clone(),
            source: self.source.clone(),
            methods: self.methods.clone(),
        }
    }
}

impl<R: CacheRecord> std::fmt::Debug for CacheDao<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDao")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl<R: CacheRecord> CacheDao<R> {
    /// 创建DAO构建器
    pub fn builder() -> CacheDaoBuilder<R> {
        CacheDaoBuilder::new()
    }

    /// 实体元数据
    pub fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    /// 注册数据访问方法句柄
    ///
    /// 方法名必须与通知注解中的 `func` 一致；未声明通知信息的
    /// 方法无法参与查询缓存
    pub fn register_method(&self, method: impl Into<String>, handle: MethodHandle<R>) {
        let method = method.into();
        if self.meta.method_map.get(&method).is_none() {
            warn!("方法 '{}' 没有声明通知注解，查询缓存将无法命中", method);
        }
        self.methods.insert(method, handle);
    }

    pub(crate) fn method_handle(&self, method: &str) -> CacheResult<MethodHandle<R>> {
        self.methods
            .get(method)
            .map(|handle| handle.clone())
            .ok_or_else(|| CacheError::MethodNotFound {
                method: method.to_string(),
            })
    }
}

/// 缓存DAO构建器
pub struct CacheDaoBuilder<R: CacheRecord> {
    ctx: Option<Arc<CacheContext>>,
    source: Option<Arc<dyn RecordSource<R>>>,
    serializer: Option<Arc<dyn Serializer<R>>>,
    user_prefix: Option<String>,
    expire_secs: Option<u32>,
    notify_tags: Vec<String>,
}

impl<R: CacheRecord> CacheDaoBuilder<R> {
    fn new() -> Self {
        Self {
            ctx: None,
            source: None,
            serializer: None,
            user_prefix: None,
            expire_secs: None,
            notify_tags: Vec::new(),
        }
    }

    /// 绑定进程级上下文
    pub fn context(mut self, ctx: Arc<CacheContext>) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// 绑定按主键回源的数据源
    pub fn source(mut self, source: Arc<dyn RecordSource<R>>) -> Self {
        self.source = Some(source);
        self
    }

    /// 覆盖默认的JSON序列化器
    pub fn serializer(mut self, serializer: Arc<dyn Serializer<R>>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// 设置对象前缀的用户前缀部分
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_prefix = Some(prefix.into());
        self
    }

    /// 覆盖默认过期时间（秒）
    pub fn expire_secs(mut self, secs: u32) -> Self {
        self.expire_secs = Some(secs);
        self
    }

    /// 追加一条通知注解
    ///
    /// 形如 `func=FindByName;type=concrete;keys=['Name'];args=[1]`
    pub fn notify(mut self, tag: impl Into<String>) -> Self {
        self.notify_tags.push(tag.into());
        self
    }

    /// 组装并校验DAO
    pub fn build(self) -> CacheResult<CacheDao<R>> {
        let ctx = self.ctx.ok_or_else(|| CacheError::ConfigError {
            message: "CacheDao 需要绑定缓存上下文".to_string(),
        })?;
        let source = self.source.ok_or_else(|| CacheError::ConfigError {
            message: "CacheDao 需要绑定数据源".to_string(),
        })?;

        let expire_secs = self
            .expire_secs
            .or(Some(ctx.config().default_expire_secs));
        let meta = Arc::new(EntityMeta::assemble(
            R::type_name(),
            self.user_prefix.as_deref(),
            R::id_field_name(),
            expire_secs,
            &self.notify_tags,
        )?);

        // 主键字段必须能从记录上读出
        if R::default().field_text(&meta.id_field).is_none() {
            return Err(CacheError::ValidationError {
                field: meta.id_field.clone(),
                message: format!(
                    "记录类型 '{}' 未暴露主键字段，无法映射到缓存主键",
                    R::type_name()
                ),
            });
        }

        let keys = KeyBuilder::new(meta.object_prefix.clone());
        let versions = VersionStore::new(ctx.kv(), keys.clone(), meta.clone());
        let serializer = self
            .serializer
            .unwrap_or_else(|| Arc::new(JsonSerializer::<R>::new()));

        info!(
            "缓存DAO就绪: 实体={}, 前缀={}, 通知信息={}个",
            R::type_name(),
            meta.object_prefix,
            meta.notify_infos.len()
        );

        Ok(CacheDao {
            ctx,
            meta,
            keys,
            versions,
            serializer,
            source,
            methods: Arc::new(DashMap::new()),
        })
    }
}
