//! The native call surface and the session that serializes access to it.

#[cfg(feature = "liblsf")]
mod live;
mod snapshot;

#[cfg(feature = "liblsf")]
pub use live::LiveSurface;
pub use snapshot::{Response, SnapshotFile, SnapshotSurface};

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{DecoderConfig, LayoutVersion};
use crate::decoder::{Layouts, NativeAddr, NativeMemory};
use crate::error::{DecodeError, ErrorCode, NativeError, Result};
use crate::views::{
    AccountingRecordView, Assembly, CatalogView, ClusterInfoView, ClusterView, ConfTree,
    Context, HostLoadView, HostView, PlacementView, SharedResourceView, accounting_record_view,
    catalog_view, cluster_info_view, cluster_view, conf_tree, host_factor, host_load_view, host_view,
    index_names, num_indices, placement_view, shared_resource_view,
};

/// One call into the native library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ClusterName,
    MasterName,
    HostInfo { resreq: Option<String>, hosts: Vec<String>, options: i32 },
    ClusterInfo { resreq: Option<String>, clusters: Vec<String>, options: i32 },
    Load { resreq: Option<String>, hosts: Vec<String>, options: i32, from_host: Option<String> },
    Info,
    IndexNames { info: NativeAddr },
    HostType { host: Option<String> },
    HostModel { host: Option<String> },
    HostFactor { host: Option<String> },
    PlaceReq { resreq: Option<String>, num_hosts: i32, options: i32, from_host: Option<String> },
    SharedResourceInfo { resources: Vec<String>, hostname: Option<String> },
    ReadCluster { file: String },
    GetConf { file: String },
    AccountingRecord { file: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    ClusterName,
    MasterName,
    HostInfo,
    ClusterInfo,
    Load,
    Info,
    IndexNames,
    HostType,
    HostModel,
    HostFactor,
    PlaceReq,
    SharedResourceInfo,
    ReadCluster,
    GetConf,
    AccountingRecord,
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::ClusterName => RequestKind::ClusterName,
            Request::MasterName => RequestKind::MasterName,
            Request::HostInfo { .. } => RequestKind::HostInfo,
            Request::ClusterInfo { .. } => RequestKind::ClusterInfo,
            Request::Load { .. } => RequestKind::Load,
            Request::Info => RequestKind::Info,
            Request::IndexNames { .. } => RequestKind::IndexNames,
            Request::HostType { .. } => RequestKind::HostType,
            Request::HostModel { .. } => RequestKind::HostModel,
            Request::HostFactor { .. } => RequestKind::HostFactor,
            Request::PlaceReq { .. } => RequestKind::PlaceReq,
            Request::SharedResourceInfo { .. } => RequestKind::SharedResourceInfo,
            Request::ReadCluster { .. } => RequestKind::ReadCluster,
            Request::GetConf { .. } => RequestKind::GetConf,
            Request::AccountingRecord { .. } => RequestKind::AccountingRecord,
        }
    }
}

impl RequestKind {
    /// Name of the library function serving this request.
    pub fn native_call(self) -> &'static str {
        match self {
            RequestKind::ClusterName => "ls_getclustername",
            RequestKind::MasterName => "ls_getmastername",
            RequestKind::HostInfo => "ls_gethostinfo",
            RequestKind::ClusterInfo => "ls_clusterinfo",
            RequestKind::Load => "ls_load",
            RequestKind::Info => "ls_info",
            RequestKind::IndexNames => "ls_indexnames",
            RequestKind::HostType => "ls_gethosttype",
            RequestKind::HostModel => "ls_gethostmodel",
            RequestKind::HostFactor => "ls_gethostfactor",
            RequestKind::PlaceReq => "ls_placereq",
            RequestKind::SharedResourceInfo => "ls_sharedresourceinfo",
            RequestKind::ReadCluster => "ls_readcluster",
            RequestKind::GetConf => "ls_getconf",
            RequestKind::AccountingRecord => "ls_getacctrec",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.native_call())
    }
}

/// What a native call handed back: a result address, the out-parameter
/// count when the call has one, and how to give the memory back.
///
/// The release hook runs exactly once, on [`RawResult::release`] or on drop.
pub struct RawResult {
    kind: RequestKind,
    addr: NativeAddr,
    count: Option<i32>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl RawResult {
    pub fn new(kind: RequestKind, addr: NativeAddr) -> Self {
        Self { kind, addr, count: None, release: None }
    }

    pub fn with_count(mut self, count: i32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn addr(&self) -> NativeAddr {
        self.addr
    }

    pub fn count(&self) -> Option<i32> {
        self.count
    }

    /// The element count of a counted call. A result without one cannot be
    /// walked.
    pub fn required_count(&self) -> std::result::Result<i32, DecodeError> {
        self.count.ok_or(DecodeError::MissingCount { call: self.kind.native_call() })
    }

    pub fn release(mut self) {
        if let Some(hook) = self.release.take() {
            debug!(kind = %self.kind, result = %self.addr, "releasing native result");
            hook();
        }
    }
}

impl Drop for RawResult {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl fmt::Debug for RawResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResult")
            .field("kind", &self.kind)
            .field("addr", &self.addr)
            .field("count", &self.count)
            .field("owned", &self.release.is_some())
            .finish()
    }
}

/// Something that answers native calls and exposes the memory results live in.
pub trait NativeSurface: Send {
    fn name(&self) -> &'static str;

    fn memory(&self) -> &dyn NativeMemory;

    fn call(&mut self, request: &Request) -> std::result::Result<RawResult, NativeError>;

    /// Layout revision the surface knows its results use, if any.
    fn layout_hint(&self) -> Option<LayoutVersion> {
        None
    }
}

/// Serialized access to one native surface.
///
/// Each query holds the lock across the native call and the decoding of
/// its result; the returned views own their data.
pub struct Session {
    surface: Mutex<Box<dyn NativeSurface>>,
    config: DecoderConfig,
    layouts: Layouts,
}

type Batch<V> = Vec<std::result::Result<V, DecodeError>>;

impl Session {
    pub fn new(surface: Box<dyn NativeSurface>, config: DecoderConfig) -> Self {
        let layouts = Layouts::for_version(config.layout);
        Self { surface: Mutex::new(surface), config, layouts }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn layouts(&self) -> &Layouts {
        &self.layouts
    }

    fn assemble<V>(
        &self,
        surface: &dyn NativeSurface,
        raw: RawResult,
        build: impl FnOnce(&Context<'_>, &RawResult) -> std::result::Result<V, DecodeError>,
    ) -> std::result::Result<V, DecodeError> {
        let ctx = Context::new(surface.memory(), &self.layouts, &self.config);
        let mut assembly = Assembly::new(raw);
        assembly.resolve(|raw| build(&ctx, raw));
        assembly.into_view()
    }

    fn query<V>(
        &self,
        request: &Request,
        build: impl FnOnce(&Context<'_>, &RawResult) -> std::result::Result<V, DecodeError>,
    ) -> Result<V> {
        let mut surface = self.surface.lock();
        let raw = surface.call(request)?;
        Ok(self.assemble(&**surface, raw, build)?)
    }

    fn scalar_text(&self, request: &Request, field: &'static str) -> Result<String> {
        self.query(request, |ctx, raw| {
            ctx.record(|asm| {
                let name = asm.defer_result_text(field, raw.addr());
                asm.resolve_text(name)?
                    .ok_or(DecodeError::UnmappedAddress { addr: raw.addr(), len: 1 })
            })
        })
    }

    /// Name of the local cluster.
    pub fn cluster_name(&self) -> Result<String> {
        self.scalar_text(&Request::ClusterName, "clusterName")
    }

    /// Name of the current master host.
    pub fn master_name(&self) -> Result<String> {
        self.scalar_text(&Request::MasterName, "masterName")
    }

    /// Host type of `host`, or of the local host when `None`.
    pub fn host_type(&self, host: Option<String>) -> Result<String> {
        self.scalar_text(&Request::HostType { host }, "hostType")
    }

    /// Host model of `host`, or of the local host when `None`.
    pub fn host_model(&self, host: Option<String>) -> Result<String> {
        self.scalar_text(&Request::HostModel { host }, "hostModel")
    }

    /// CPU factor of `host`, or of the local host when `None`.
    pub fn host_factor(&self, host: Option<String>) -> Result<f32> {
        self.query(&Request::HostFactor { host }, |ctx, raw| {
            ctx.record(|asm| host_factor(asm, raw.addr()))
        })
    }

    /// Load index names in index order, the same order as each host's
    /// load vector.
    pub fn index_names(&self) -> Result<Vec<String>> {
        let mut surface = self.surface.lock();
        let (_, names) = self.index_table(&mut **surface)?;
        Ok(names)
    }

    /// `ls_info` for the index count, then `ls_indexnames` on that result.
    /// The caller holds the lock across both calls.
    fn index_table(&self, surface: &mut dyn NativeSurface) -> Result<(i32, Vec<String>)> {
        let info = surface.call(&Request::Info)?;
        let info_addr = info.addr();
        let indices = self.assemble(surface, info, |ctx, raw| {
            ctx.record(|asm| num_indices(asm, raw.addr()))
        })?;

        let raw = surface.call(&Request::IndexNames { info: info_addr })?;
        let names = self.assemble(surface, raw, |ctx, raw| {
            ctx.record(|asm| index_names(asm, raw.addr(), indices))
        })?;
        debug!(indices, "load index table");
        Ok((indices, names))
    }

    pub fn hosts(&self, resreq: Option<String>, hosts: Vec<String>, options: i32) -> Result<Batch<HostView>> {
        let stride = self.layouts.host_info.size;
        self.query(&Request::HostInfo { resreq, hosts, options }, |ctx, raw| {
            ctx.batch("hostInfo", raw.required_count()?, raw.addr(), stride, host_view)
        })
    }

    pub fn clusters(
        &self,
        resreq: Option<String>,
        clusters: Vec<String>,
        options: i32,
    ) -> Result<Batch<ClusterInfoView>> {
        let stride = self.layouts.cluster_info.size;
        self.query(&Request::ClusterInfo { resreq, clusters, options }, |ctx, raw| {
            ctx.batch("clusterInfo", raw.required_count()?, raw.addr(), stride, cluster_info_view)
        })
    }

    /// Load of the selected hosts. Asks for the load index count and names
    /// first, inside the same critical section.
    pub fn load(
        &self,
        resreq: Option<String>,
        hosts: Vec<String>,
        options: i32,
        from_host: Option<String>,
    ) -> Result<Batch<HostLoadView>> {
        let mut surface = self.surface.lock();
        let (indices, names) = self.index_table(&mut **surface)?;

        let raw = surface.call(&Request::Load { resreq, hosts, options, from_host })?;
        let stride = self.layouts.host_load.size;
        Ok(self.assemble(&**surface, raw, |ctx, raw| {
            ctx.batch("hostLoad", raw.required_count()?, raw.addr(), stride, |asm, addr| {
                host_load_view(asm, addr, indices, &names)
            })
        })?)
    }

    /// Resource, host type and host model tables.
    pub fn info(&self) -> Result<CatalogView> {
        self.query(&Request::Info, |ctx, raw| ctx.record(|asm| catalog_view(asm, raw.addr())))
    }

    pub fn place(
        &self,
        resreq: Option<String>,
        num_hosts: i32,
        options: i32,
        from_host: Option<String>,
    ) -> Result<PlacementView> {
        self.query(&Request::PlaceReq { resreq, num_hosts, options, from_host }, |ctx, raw| {
            let count = raw.required_count()?;
            ctx.record(|asm| placement_view(asm, raw.addr(), count))
        })
    }

    pub fn shared_resources(
        &self,
        resources: Vec<String>,
        hostname: Option<String>,
    ) -> Result<Batch<SharedResourceView>> {
        let stride = self.layouts.shared_resource_info.size;
        self.query(&Request::SharedResourceInfo { resources, hostname }, |ctx, raw| {
            ctx.batch("lsSharedResourceInfo", raw.required_count()?, raw.addr(), stride, shared_resource_view)
        })
    }

    /// A cluster read from its configuration file.
    pub fn cluster(&self, file: String) -> Result<ClusterView> {
        self.query(&Request::ReadCluster { file }, |ctx, raw| {
            ctx.record(|asm| cluster_view(asm, raw.addr()))
        })
    }

    /// A configuration file parsed by the library.
    pub fn conf(&self, file: String) -> Result<ConfTree> {
        self.query(&Request::GetConf { file }, |ctx, raw| ctx.record(|asm| conf_tree(asm, raw.addr())))
    }

    /// Every record of an accounting file, read until the library reports
    /// end of file.
    pub fn accounting_records(&self, file: String) -> Result<Batch<AccountingRecordView>> {
        let request = Request::AccountingRecord { file };
        let mut surface = self.surface.lock();
        let mut records = Vec::new();
        loop {
            if records.len() >= self.config.max_elements {
                warn!(limit = self.config.max_elements, "stopping accounting read at the element limit");
                break;
            }
            let raw = match surface.call(&request) {
                Ok(raw) => raw,
                Err(error) if error.code == ErrorCode::EOF => break,
                Err(error) => return Err(error.into()),
            };
            let record = self.assemble(&**surface, raw, |ctx, raw| {
                ctx.record(|asm| accounting_record_view(asm, raw.addr()))
            });
            if let Err(error) = &record {
                warn!(index = records.len(), %error, "accounting record failed to decode");
            }
            records.push(record);
        }
        Ok(records)
    }
}
