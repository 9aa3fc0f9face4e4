//! Turns raw results into views, one top-level record at a time.

use std::cell::Cell;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    Admin, AccountingRecordView, CatalogView, ClusterInfoView, ClusterView, HostLoadView,
    HostModel, HostTopology, HostView, PlacementView, ResourceDescriptor, ResourceUsage,
    SharedResourceInstanceView, SharedResourceView,
};
use crate::config::DecoderConfig;
use crate::decoder::{
    ArrayElement, CountSource, CountedArrayRef, Element, LazyArray, LazyText, Layouts,
    NativeAddr, NativeMemory, StructLayout,
};
use crate::error::DecodeError;
use crate::status::{ClusterStatus, HostStatus, LicenseFeatures, get_intnum};
use crate::surface::RawResult;

/// Everything needed to decode results of one session.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub memory: &'a dyn NativeMemory,
    pub layouts: &'a Layouts,
    pub config: &'a DecoderConfig,
}

impl<'a> Context<'a> {
    pub fn new(memory: &'a dyn NativeMemory, layouts: &'a Layouts, config: &'a DecoderConfig) -> Self {
        Self { memory, layouts, config }
    }

    /// Builds one top-level record. Fails if any lazy field is left pending.
    pub fn record<V>(
        &self,
        build: impl FnOnce(&Assembler<'a>) -> Result<V, DecodeError>,
    ) -> Result<V, DecodeError> {
        let asm = Assembler::new(*self);
        let view = build(&asm)?;
        asm.finish(view)
    }

    /// Builds one record per element of a top-level array.
    ///
    /// An inconsistent top-level count fails the whole batch; a record that
    /// fails to decode is reported in its own slot and leaves its siblings
    /// alone.
    pub fn batch<V>(
        &self,
        field: &'static str,
        count: i32,
        base: NativeAddr,
        stride: usize,
        build: impl Fn(&Assembler<'a>, NativeAddr) -> Result<V, DecodeError>,
    ) -> Result<Vec<Result<V, DecodeError>>, DecodeError> {
        let array = CountedArrayRef::new(field, count, base, stride, self.config.max_elements)?;
        let records = array
            .addresses()?
            .into_iter()
            .enumerate()
            .map(|(index, addr)| {
                let record = self.record(|asm| build(asm, addr));
                if let Err(error) = &record {
                    warn!(field, index, %error, "record failed to decode");
                }
                record
            })
            .collect();
        Ok(records)
    }
}

/// Tracks lazy fields handed out while building one record.
///
/// Every `defer_*` call must be matched by a `resolve_*` call before
/// [`Assembler::finish`] lets the view out.
pub struct Assembler<'a> {
    ctx: Context<'a>,
    issued: Cell<usize>,
    resolved: Cell<usize>,
}

impl<'a> Assembler<'a> {
    pub fn new(ctx: Context<'a>) -> Self {
        Self { ctx, issued: Cell::new(0), resolved: Cell::new(0) }
    }

    pub fn layouts(&self) -> &'a Layouts {
        self.ctx.layouts
    }

    pub fn max_elements(&self) -> usize {
        self.ctx.config.max_elements
    }

    pub fn pending(&self) -> usize {
        self.issued.get().saturating_sub(self.resolved.get())
    }

    fn issue(&self, n: usize) {
        self.issued.set(self.issued.get() + n);
    }

    fn settle(&self) {
        self.resolved.set(self.resolved.get() + 1);
    }

    pub fn load(&self, addr: NativeAddr, layout: &Arc<StructLayout>) -> Result<Element, DecodeError> {
        Element::load(self.ctx.memory, addr, Arc::clone(layout))
    }

    pub fn defer_text(&self, element: &Element, field: &'static str) -> Result<LazyText, DecodeError> {
        let text = element.lazy_text(field)?;
        self.issue(1);
        Ok(text)
    }

    pub fn defer_array<T: ArrayElement>(
        &self,
        element: &Element,
        field: &'static str,
        shape: T::Shape,
        count: CountSource,
    ) -> Result<LazyArray<T>, DecodeError> {
        let array = element.lazy_array(field, shape, count)?;
        self.issue(1);
        Ok(array)
    }

    /// Defers an array handed back directly by a native call.
    pub fn defer_result<T: ArrayElement>(
        &self,
        field: &'static str,
        base: NativeAddr,
        shape: T::Shape,
        count: CountSource,
    ) -> LazyArray<T> {
        self.issue(1);
        LazyArray::new(field, base, shape, count)
    }

    /// Defers a `char *` handed back directly by a native call.
    pub fn defer_result_text(&self, field: &'static str, addr: NativeAddr) -> LazyText {
        self.issue(1);
        LazyText::new(field, addr)
    }

    pub fn resolve_text(&self, text: LazyText) -> Result<Option<String>, DecodeError> {
        let value = text.resolve(self.ctx.memory, self.ctx.config.max_string_len)?;
        self.settle();
        Ok(value)
    }

    pub fn resolve_array<T: ArrayElement>(
        &self,
        array: LazyArray<T>,
        count: i32,
    ) -> Result<Vec<T>, DecodeError> {
        let values = array.resolve(self.ctx.memory, count, self.ctx.config.max_elements)?;
        self.settle();
        Ok(values)
    }

    /// Like [`Assembler::resolve_array`], but a null pointer is an absent array.
    pub fn resolve_optional_array<T: ArrayElement>(
        &self,
        array: LazyArray<T>,
        count: i32,
    ) -> Result<Option<Vec<T>>, DecodeError> {
        if array.is_null() {
            self.settle();
            return Ok(None);
        }
        self.resolve_array(array, count).map(Some)
    }

    /// Resolves an array whose count is a sibling field of `element`.
    pub fn resolve_counted<T: ArrayElement>(
        &self,
        element: &Element,
        array: LazyArray<T>,
    ) -> Result<Vec<T>, DecodeError> {
        let count = match array.count_source() {
            CountSource::Sibling(name) => element.i32(name)?,
            CountSource::External(name) => {
                return Err(DecodeError::MissingField { structure: element.layout().name, field: name });
            }
        };
        self.resolve_array(array, count)
    }

    /// Resolves every slot of a `char **` table. Null slots inside the
    /// counted range are a protocol violation.
    pub fn resolve_strings(&self, slots: Vec<LazyText>) -> Result<Vec<String>, DecodeError> {
        self.issue(slots.len());
        let count = slots.len() as i32;
        slots
            .into_iter()
            .map(|slot| {
                let field = slot.field();
                self.resolve_text(slot)?
                    .ok_or(DecodeError::InconsistentCount { field, count })
            })
            .collect()
    }

    /// Resolves `char **` slots where null entries are allowed.
    pub fn resolve_texts(&self, slots: Vec<LazyText>) -> Result<Vec<Option<String>>, DecodeError> {
        self.issue(slots.len());
        slots.into_iter().map(|slot| self.resolve_text(slot)).collect()
    }

    /// A `char **` field counted by a sibling.
    pub fn string_list(
        &self,
        element: &Element,
        field: &'static str,
        count: &'static str,
    ) -> Result<Vec<String>, DecodeError> {
        let array = self.defer_array::<LazyText>(element, field, field, CountSource::Sibling(count))?;
        let slots = self.resolve_counted(element, array)?;
        self.resolve_strings(slots)
    }

    /// A `char *` field, resolved on the spot.
    pub fn text(&self, element: &Element, field: &'static str) -> Result<Option<String>, DecodeError> {
        let lazy = self.defer_text(element, field)?;
        self.resolve_text(lazy)
    }

    /// Releases the view once nothing is left pending.
    pub fn finish<V>(&self, view: V) -> Result<V, DecodeError> {
        match self.pending() {
            0 => Ok(view),
            pending => Err(DecodeError::UnresolvedLazyField { pending }),
        }
    }
}

/// Decoding progress of one raw query result.
///
/// Moves forward only: `Unresolved -> Resolving -> Resolved | Failed`.
#[derive(Debug)]
pub enum Assembly<V> {
    Unresolved(RawResult),
    Resolving,
    Resolved(V),
    Failed(DecodeError),
}

impl<V> Assembly<V> {
    pub fn new(raw: RawResult) -> Self {
        Assembly::Unresolved(raw)
    }

    pub fn state(&self) -> &'static str {
        match self {
            Assembly::Unresolved(_) => "unresolved",
            Assembly::Resolving => "resolving",
            Assembly::Resolved(_) => "resolved",
            Assembly::Failed(_) => "failed",
        }
    }

    /// Decodes the raw result once and releases it. Does nothing when the
    /// result was already decoded.
    pub fn resolve(&mut self, build: impl FnOnce(&RawResult) -> Result<V, DecodeError>) {
        let raw = match std::mem::replace(self, Assembly::Resolving) {
            Assembly::Unresolved(raw) => raw,
            done => {
                *self = done;
                return;
            }
        };
        let kind = raw.kind();
        debug!(?kind, "resolving raw result");
        let outcome = build(&raw);
        raw.release();
        *self = match outcome {
            Ok(view) => {
                debug!(?kind, "resolved");
                Assembly::Resolved(view)
            }
            Err(error) => {
                debug!(?kind, %error, "failed");
                Assembly::Failed(error)
            }
        };
    }

    pub fn view(&self) -> Option<&V> {
        match self {
            Assembly::Resolved(view) => Some(view),
            _ => None,
        }
    }

    pub fn into_view(self) -> Result<V, DecodeError> {
        match self {
            Assembly::Resolved(view) => Ok(view),
            Assembly::Failed(error) => Err(error),
            Assembly::Unresolved(_) | Assembly::Resolving => {
                Err(DecodeError::UnresolvedLazyField { pending: 1 })
            }
        }
    }
}

pub fn host_view(asm: &Assembler<'_>, addr: NativeAddr) -> Result<HostView, DecodeError> {
    let host = asm.load(addr, &asm.layouts().host_info)?;
    host_from_element(asm, &host)
}

fn host_from_element(asm: &Assembler<'_>, host: &Element) -> Result<HostView, DecodeError> {
    let thresholds = asm.defer_array::<f32>(host, "busyThreshold", (), CountSource::Sibling("numIndx"))?;

    let topology = if host.has("cores") {
        Some(HostTopology {
            license_class: host.i32("licClass")?,
            cores: host.i32("cores")?,
            address: host.text("hostAddr")?,
            processors: host.i32("pprocs")?,
            cores_per_processor: host.i32("cores_per_proc")?,
            threads_per_core: host.i32("threads_per_core")?,
        })
    } else {
        None
    };

    Ok(HostView {
        name: host.text("hostName")?,
        host_type: asm.text(host, "hostType")?,
        model: asm.text(host, "hostModel")?,
        cpu_factor: host.f32("cpuFactor")?,
        max_cpus: host.i32("maxCpus")?,
        max_mem: host.i32("maxMem")?,
        max_swap: host.i32("maxSwap")?,
        max_tmp: host.i32("maxTmp")?,
        disks: host.i32("nDisks")?,
        resources: asm.string_list(host, "resources", "nRes")?,
        dynamic_resources: asm.string_list(host, "DResources", "nDRes")?,
        windows: asm.text(host, "windows")?,
        busy_thresholds: asm.resolve_counted(host, thresholds)?,
        is_server: host.u8("isServer")? != 0,
        licensed: host.u8("licensed")? != 0,
        rex_priority: host.i32("rexPriority")?,
        license_features: LicenseFeatures::new(host.i32("licFeaturesNeeded")?),
        topology,
    })
}

/// Decodes one `hostLoad`. Its status and load arrays are sized by the
/// number of load indices from a separate `ls_info` call.
pub fn host_load_view(
    asm: &Assembler<'_>,
    addr: NativeAddr,
    num_indices: i32,
    index_names: &[String],
) -> Result<HostLoadView, DecodeError> {
    let load = asm.load(addr, &asm.layouts().host_load)?;
    let status = asm.defer_array::<i32>(&load, "status", (), CountSource::External("numIndx"))?;
    let li = asm.defer_array::<f32>(&load, "li", (), CountSource::External("numIndx"))?;

    let indices = usize::try_from(num_indices).unwrap_or(0);
    let words = (1 + get_intnum(indices)) as i32;
    let status = match asm.resolve_optional_array(status, words)? {
        Some(words) => HostStatus::new(words.into_iter().map(|w| w as u32).collect(), indices),
        None => HostStatus::absent(indices),
    };

    Ok(HostLoadView {
        name: load.text("hostName")?,
        busy_on: status.busy_indices(),
        status,
        index_names: index_names.to_vec(),
        load: asm.resolve_array(li, num_indices)?,
    })
}

pub fn cluster_info_view(asm: &Assembler<'_>, addr: NativeAddr) -> Result<ClusterInfoView, DecodeError> {
    let info = asm.load(addr, &asm.layouts().cluster_info)?;

    let ids = asm.defer_array::<i32>(&info, "adminIds", (), CountSource::Sibling("nAdmins"))?;
    let ids = asm.resolve_counted(&info, ids)?;
    let names = asm.defer_array::<LazyText>(&info, "admins", "admins", CountSource::Sibling("nAdmins"))?;
    let names = asm.resolve_counted(&info, names)?;
    let admins = ids
        .into_iter()
        .zip(asm.resolve_texts(names)?)
        .map(|(id, name)| Admin { id, name })
        .collect();

    Ok(ClusterInfoView {
        name: info.text("clusterName")?,
        status: ClusterStatus::new(info.i32("status")?),
        master: info.text("masterName")?,
        manager_name: info.text("managerName")?,
        manager_id: info.i32("managerId")?,
        servers: info.i32("numServers")?,
        clients: info.i32("numClients")?,
        resources: asm.string_list(&info, "resources", "nRes")?,
        host_types: asm.string_list(&info, "hostTypes", "nTypes")?,
        host_models: asm.string_list(&info, "hostModels", "nModels")?,
        admins,
        analyzer_license: info.i32("analyzerLicFlag")?,
        job_scheduler_license: info.i32("jsLicFlag")?,
        after_hours_window: info.text("afterHoursWindow")?,
        prefer_auth_name: info.text("preferAuthName")?,
        in_use_auth_name: info.text("inUseAuthName")?,
    })
}

pub fn shared_resource_view(
    asm: &Assembler<'_>,
    addr: NativeAddr,
) -> Result<SharedResourceView, DecodeError> {
    let resource = asm.load(addr, &asm.layouts().shared_resource_info)?;
    shared_from_element(asm, &resource)
}

fn shared_from_element(asm: &Assembler<'_>, resource: &Element) -> Result<SharedResourceView, DecodeError> {
    let layout = Arc::clone(&asm.layouts().shared_resource_instance);
    let instances =
        asm.defer_array::<Element>(resource, "instances", layout, CountSource::Sibling("nInstances"))?;
    let instances = asm
        .resolve_counted(resource, instances)?
        .iter()
        .map(|instance| {
            Ok(SharedResourceInstanceView {
                value: asm.text(instance, "value")?,
                hosts: asm.string_list(instance, "hostList", "nHosts")?,
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(SharedResourceView { name: asm.text(resource, "resourceName")?, instances })
}

/// Decodes a `clusterConf` from `ls_readcluster`.
pub fn cluster_view(asm: &Assembler<'_>, addr: NativeAddr) -> Result<ClusterView, DecodeError> {
    let layouts = asm.layouts();
    let conf = asm.load(addr, &layouts.cluster_conf)?;

    let clinfo = conf.ptr("clinfo")?;
    let info = if clinfo.is_null() { None } else { Some(cluster_info_view(asm, clinfo)?) };

    let hosts = asm.defer_array::<Element>(
        &conf,
        "hosts",
        Arc::clone(&layouts.host_info),
        CountSource::Sibling("numHosts"),
    )?;
    let shared = asm.defer_array::<Element>(
        &conf,
        "shareRes",
        Arc::clone(&layouts.shared_resource_info),
        CountSource::Sibling("numShareRes"),
    )?;

    let hosts = asm
        .resolve_counted(&conf, hosts)?
        .iter()
        .map(|host| host_from_element(asm, host))
        .collect::<Result<Vec<_>, _>>()?;
    let shared_resources = asm
        .resolve_counted(&conf, shared)?
        .iter()
        .map(|resource| shared_from_element(asm, resource))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ClusterView {
        info,
        hosts,
        default_features: LicenseFeatures::new(conf.i32("defaultFeatures")?),
        shared_resources,
    })
}

pub fn resource_descriptor(item: &Element) -> Result<ResourceDescriptor, DecodeError> {
    Ok(ResourceDescriptor {
        name: item.text("name")?,
        description: item.text("des")?,
        value_type: item.i32("valueType")?.into(),
        order_type: item.i32("orderType")?.into(),
        flags: crate::status::ResourceFlags::new(item.i32("flags")?),
        interval: item.i32("interval")?,
    })
}

/// Decodes the `lsInfo` catalog. Fixed tables are cut to their counts.
pub fn catalog_view(asm: &Assembler<'_>, addr: NativeAddr) -> Result<CatalogView, DecodeError> {
    let layouts = asm.layouts();
    let info = asm.load(addr, &layouts.ls_info)?;

    let table = asm.defer_array::<Element>(
        &info,
        "resTable",
        Arc::clone(&layouts.res_item),
        CountSource::Sibling("nRes"),
    )?;
    let resources = asm
        .resolve_counted(&info, table)?
        .iter()
        .map(resource_descriptor)
        .collect::<Result<Vec<_>, _>>()?;

    let n_models = info.i32("nModels")?;
    let names = info.text_table("hostModels", n_models)?;
    let archs: Vec<Option<String>> = if info.has("hostArchs") {
        info.text_table("hostArchs", n_models)?.into_iter().map(Some).collect()
    } else {
        vec![None; names.len()]
    };
    let refs = info.i32_table("modelRefs", n_models)?;
    let factors = info.f32_table("cpuFactor", n_models)?;

    let host_models = names
        .into_iter()
        .zip(archs)
        .zip(refs.into_iter().zip(factors))
        .map(|((name, arch), (model_ref, cpu_factor))| HostModel { name, arch, model_ref, cpu_factor })
        .collect();

    Ok(CatalogView {
        resources,
        host_types: info.text_table("hostTypes", info.i32("nTypes")?)?,
        host_models,
        num_indices: info.i32("numIndx")?,
        num_user_indices: info.i32("numUsrIndx")?,
    })
}

/// Number of load indices declared by an `lsInfo`.
pub fn num_indices(asm: &Assembler<'_>, addr: NativeAddr) -> Result<i32, DecodeError> {
    asm.load(addr, &asm.layouts().ls_info)?.i32("numIndx")
}

/// Decodes the `char **` returned by `ls_indexnames`, one name per load index.
pub fn index_names(
    asm: &Assembler<'_>,
    addr: NativeAddr,
    num_indices: i32,
) -> Result<Vec<String>, DecodeError> {
    let list = asm.defer_result::<LazyText>("indexNames", addr, "indexNames", CountSource::External("numIndx"));
    let slots = asm.resolve_array(list, num_indices)?;
    asm.resolve_strings(slots)
}

/// Reads the `float *` returned by `ls_gethostfactor`.
pub fn host_factor(asm: &Assembler<'_>, addr: NativeAddr) -> Result<f32, DecodeError> {
    let factor = asm.defer_result::<f32>("hostFactor", addr, (), CountSource::External("hostFactor"));
    asm.resolve_array(factor, 1)?
        .first()
        .copied()
        .ok_or(DecodeError::InconsistentCount { field: "hostFactor", count: 1 })
}

/// Decodes the `char **` host list returned by `ls_placereq`.
pub fn placement_view(
    asm: &Assembler<'_>,
    addr: NativeAddr,
    count: i32,
) -> Result<PlacementView, DecodeError> {
    let list = asm.defer_result::<LazyText>("hostList", addr, "hostList", CountSource::External("numHosts"));
    let slots = asm.resolve_array(list, count)?;
    Ok(PlacementView { hosts: asm.resolve_strings(slots)? })
}

pub fn accounting_record_view(
    asm: &Assembler<'_>,
    addr: NativeAddr,
) -> Result<AccountingRecordView, DecodeError> {
    let layouts = asm.layouts();
    let record = asm.load(addr, &layouts.lsf_acct_rec)?;
    let ru = record.embedded("lsfRu", &layouts.lsf_rusage)?;

    let usage = ResourceUsage {
        utime: ru.f64("ru_utime")?,
        stime: ru.f64("ru_stime")?,
        maxrss: ru.f64("ru_maxrss")?,
        ixrss: ru.f64("ru_ixrss")?,
        ismrss: ru.f64("ru_ismrss")?,
        idrss: ru.f64("ru_idrss")?,
        isrss: ru.f64("ru_isrss")?,
        minflt: ru.f64("ru_minflt")?,
        majflt: ru.f64("ru_majflt")?,
        nswap: ru.f64("ru_nswap")?,
        inblock: ru.f64("ru_inblock")?,
        oublock: ru.f64("ru_oublock")?,
        ioch: ru.f64("ru_ioch")?,
        msgsnd: ru.f64("ru_msgsnd")?,
        msgrcv: ru.f64("ru_msgrcv")?,
        nsignals: ru.f64("ru_nsignals")?,
        nvcsw: ru.f64("ru_nvcsw")?,
        nivcsw: ru.f64("ru_nivcsw")?,
        exutime: ru.f64("ru_exutime")?,
    };

    Ok(AccountingRecordView {
        pid: record.i32("pid")?,
        user: asm.text(&record, "username")?,
        exit_status: record.i32("exitStatus")?,
        dispatch_time: record.long("dispTime")?,
        termination_time: record.long("termTime")?,
        from_host: asm.text(&record, "fromHost")?,
        exec_host: asm.text(&record, "execHost")?,
        cwd: asm.text(&record, "cwd")?,
        command: asm.text(&record, "cmdln")?,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutVersion;
    use crate::decoder::MemoryImage;
    use crate::surface::RequestKind;
    use crate::testutil::{self, StructWriter};

    struct Fixture {
        memory: MemoryImage,
        layouts: Layouts,
        config: DecoderConfig,
    }

    impl Fixture {
        fn new(version: LayoutVersion) -> Self {
            Self {
                memory: MemoryImage::new(),
                layouts: Layouts::for_version(version),
                config: DecoderConfig { layout: version, ..DecoderConfig::default() },
            }
        }

        fn ctx(&self) -> Context<'_> {
            Context::new(&self.memory, &self.layouts, &self.config)
        }
    }

    #[test]
    fn test_pending_lazy_field_blocks_the_view() {
        let mut fx = Fixture::new(LayoutVersion::Lsf706);
        let host = testutil::host_info(&mut fx.memory, &fx.layouts, "hostA", &[], &[]);
        let addr = fx.memory.alloc(host);

        let result = fx.ctx().record(|asm| {
            let host = asm.load(addr, &asm.layouts().host_info)?;
            let _windows = asm.defer_text(&host, "windows")?;
            host.text("hostName")
        });
        assert_eq!(result, Err(DecodeError::UnresolvedLazyField { pending: 1 }));
    }

    #[test]
    fn test_assembly_moves_forward_once() {
        let mut fx = Fixture::new(LayoutVersion::Lsf706);
        let name = testutil::cstr(&mut fx.memory, "lsf_prod");
        let ctx = fx.ctx();

        let mut assembly = Assembly::new(RawResult::new(RequestKind::ClusterName, name));
        assert_eq!(assembly.state(), "unresolved");
        assembly.resolve(|raw| {
            ctx.record(|asm| {
                let text = asm.defer_result_text("clusterName", raw.addr());
                asm.resolve_text(text)
            })
        });
        assert_eq!(assembly.state(), "resolved");
        assembly.resolve(|_| Err(DecodeError::InvalidText { field: "clusterName" }));
        assert_eq!(assembly.view(), Some(&Some("lsf_prod".to_string())));
    }

    #[test]
    fn test_unresolved_assembly_has_no_view() {
        let assembly: Assembly<()> = Assembly::new(RawResult::new(RequestKind::Info, NativeAddr(0x10)));
        assert_eq!(assembly.view(), None);
        assert_eq!(assembly.into_view(), Err(DecodeError::UnresolvedLazyField { pending: 1 }));
    }

    #[test]
    fn test_host_zero_count_stale_pointer_untouched() {
        let mut fx = Fixture::new(LayoutVersion::Lsf706);
        let host = testutil::host_info(&mut fx.memory, &fx.layouts, "hostA", &["cs"], &[0.5, 1.5]);
        let addr = fx.memory.alloc(host);

        let view = fx.ctx().record(|asm| host_view(asm, addr)).unwrap();
        assert!(view.dynamic_resources.is_empty());
        assert_eq!(view.windows, None);
        assert_eq!(view.host_type.as_deref(), Some("LINUX64"));
        assert_eq!(view.busy_thresholds, vec![0.5, 1.5]);
        assert!(view.license_features.has_batch());
        let topology = view.topology.unwrap();
        assert_eq!(topology.address, "10.0.0.7");
        assert_eq!(topology.threads_per_core, 2);
    }

    #[test]
    fn test_lsf70_hosts_have_no_topology() {
        let mut fx = Fixture::new(LayoutVersion::Lsf70);
        let host = testutil::host_info(&mut fx.memory, &fx.layouts, "old", &[], &[]);
        let addr = fx.memory.alloc(host);
        let view = fx.ctx().record(|asm| host_view(asm, addr)).unwrap();
        assert_eq!(view.name, "old");
        assert_eq!(view.topology, None);
    }

    #[test]
    fn test_cluster_round_trip_is_idempotent() {
        let mut fx = Fixture::new(LayoutVersion::Lsf706);
        let info = testutil::cluster_info(&mut fx.memory, &fx.layouts, "prod", &["cs"], &[(500, "lsfadmin")]);
        let info = fx.memory.alloc(info);
        let a = testutil::host_info(&mut fx.memory, &fx.layouts, "hostA", &["cs"], &[]);
        let b = testutil::host_info(&mut fx.memory, &fx.layouts, "hostB", &[], &[]);
        let hosts = testutil::struct_table(&mut fx.memory, &[a, b]);
        let licenses: &[&str] = &["hostA", "hostB"];
        let shared = testutil::shared_resource(&mut fx.memory, &fx.layouts, "licenses", &[("12", licenses)]);
        let shared = testutil::struct_table(&mut fx.memory, &[shared]);
        let conf = StructWriter::new(&fx.layouts.cluster_conf)
            .ptr("clinfo", info)
            .i32("numHosts", 2)
            .ptr("hosts", hosts)
            .i32("defaultFeatures", 1)
            .i32("numShareRes", 1)
            .ptr("shareRes", shared)
            .finish();
        let conf = fx.memory.alloc(conf);

        let first = fx.ctx().record(|asm| cluster_view(asm, conf)).unwrap();
        let second = fx.ctx().record(|asm| cluster_view(asm, conf)).unwrap();
        assert_eq!(first, second);

        let info = first.info.as_ref().unwrap();
        assert_eq!(info.name, "prod");
        assert_eq!(info.master, "hostA");
        assert_eq!(info.admins, vec![Admin { id: 500, name: Some("lsfadmin".into()) }]);
        assert!(info.host_types.is_empty());
        assert_eq!(first.hosts.len(), 2);
        assert_eq!(first.hosts[1].name, "hostB");
        assert_eq!(first.shared_resources[0].name.as_deref(), Some("licenses"));
        assert_eq!(first.shared_resources[0].instances[0].value.as_deref(), Some("12"));
        assert_eq!(first.shared_resources[0].instances[0].hosts, licenses);
    }

    #[test]
    fn test_catalog_tables_cut_to_counts() {
        let mut fx = Fixture::new(LayoutVersion::Lsf706);
        let item = StructWriter::new(&fx.layouts.res_item)
            .text("name", "mem")
            .text("des", "Available memory (Mbytes)")
            .i32("valueType", 1)
            .i32("orderType", 1)
            .i32("flags", 0x02 | 0x04)
            .i32("interval", 15)
            .finish();
        let table = testutil::struct_table(&mut fx.memory, &[item]);
        let info = StructWriter::new(&fx.layouts.ls_info)
            .i32("nRes", 1)
            .ptr("resTable", table)
            .i32("nTypes", 1)
            .text_row("hostTypes", 0, "LINUX64")
            .text_row("hostTypes", 1, "never read")
            .i32("nModels", 2)
            .text_row("hostModels", 0, "X86_64")
            .text_row("hostModels", 1, "Opteron")
            .text_row("hostArchs", 0, "x86_64")
            .i32_at("modelRefs", 1, 3)
            .f32_at("cpuFactor", 0, 60.0)
            .f32_at("cpuFactor", 1, 45.5)
            .i32("numIndx", 11)
            .i32("numUsrIndx", 0)
            .finish();
        let addr = fx.memory.alloc(info);

        let catalog = fx.ctx().record(|asm| catalog_view(asm, addr)).unwrap();
        assert_eq!(catalog.host_types, vec!["LINUX64"]);
        assert_eq!(catalog.host_models.len(), 2);
        assert_eq!(catalog.host_models[0].arch.as_deref(), Some("x86_64"));
        assert_eq!(catalog.host_models[1].arch.as_deref(), Some(""));
        assert_eq!(catalog.host_models[1].model_ref, 3);
        assert_eq!(catalog.host_models[1].cpu_factor, 45.5);
        assert_eq!(catalog.num_indices, 11);
        let mem = &catalog.resources[0];
        assert_eq!(mem.name, "mem");
        assert_eq!(mem.interval, 15);
        assert_eq!(mem.value_type, crate::status::ValueType::Numeric);
    }

    #[test]
    fn test_catalog_count_above_capacity() {
        let mut fx = Fixture::new(LayoutVersion::Lsf70);
        let info = StructWriter::new(&fx.layouts.ls_info).i32("nTypes", 129).finish();
        let addr = fx.memory.alloc(info);
        let err = fx.ctx().record(|asm| catalog_view(asm, addr)).unwrap_err();
        assert!(matches!(err, DecodeError::CountExceedsLimit { count: 129, limit: 128, .. }), "{err}");
    }

    #[test]
    fn test_admin_names_may_be_null() {
        let mut fx = Fixture::new(LayoutVersion::Lsf706);
        let ids = testutil::i32_table(&mut fx.memory, &[0, 501]);
        let root = testutil::cstr(&mut fx.memory, "root");
        let names = testutil::ptr_table(&mut fx.memory, &[root, NativeAddr::NULL]);
        let info = StructWriter::new(&fx.layouts.cluster_info)
            .text("clusterName", "dev")
            .i32("nAdmins", 2)
            .ptr("adminIds", ids)
            .ptr("admins", names)
            .finish();
        let addr = fx.memory.alloc(info);

        let view = fx.ctx().record(|asm| cluster_info_view(asm, addr)).unwrap();
        assert_eq!(view.admins[0].name.as_deref(), Some("root"));
        assert_eq!(view.admins[1], Admin { id: 501, name: None });
    }
}
