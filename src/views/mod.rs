//! Owned, immutable views of decoded query results.
//!
//! Views hold no native addresses and no references into native memory;
//! they can be shared across threads freely.

mod assemble;
mod conf;

pub use assemble::{
    Assembler, Assembly, Context, accounting_record_view, catalog_view, cluster_info_view,
    cluster_view, host_factor, host_load_view, host_view, index_names, num_indices, placement_view,
    resource_descriptor, shared_resource_view,
};
pub use conf::conf_tree;

use serde::Serialize;

use crate::status::{ClusterStatus, HostStatus, LicenseFeatures, OrderType, ResourceFlags, ValueType};

/// Processor topology, reported by 7.0.6 and later.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostTopology {
    pub license_class: i32,
    pub cores: i32,
    pub address: String,
    pub processors: i32,
    pub cores_per_processor: i32,
    pub threads_per_core: i32,
}

/// Static description of one host (`hostInfo`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostView {
    pub name: String,
    pub host_type: Option<String>,
    pub model: Option<String>,
    pub cpu_factor: f32,
    pub max_cpus: i32,
    pub max_mem: i32,
    pub max_swap: i32,
    pub max_tmp: i32,
    pub disks: i32,
    pub resources: Vec<String>,
    pub dynamic_resources: Vec<String>,
    pub windows: Option<String>,
    pub busy_thresholds: Vec<f32>,
    pub is_server: bool,
    pub licensed: bool,
    pub rex_priority: i32,
    pub license_features: LicenseFeatures,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<HostTopology>,
}

/// Load and status of one host (`hostLoad`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostLoadView {
    pub name: String,
    pub status: HostStatus,
    pub busy_on: Vec<usize>,
    /// Names of the load indices, parallel to `load`.
    pub index_names: Vec<String>,
    pub load: Vec<f32>,
}

impl HostLoadView {
    /// Load values paired with their index names.
    pub fn named_load(&self) -> impl Iterator<Item = (&str, f32)> {
        self.index_names.iter().map(String::as_str).zip(self.load.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admin {
    pub id: i32,
    pub name: Option<String>,
}

/// Summary of one cluster (`clusterInfo`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterInfoView {
    pub name: String,
    pub status: ClusterStatus,
    pub master: String,
    pub manager_name: String,
    pub manager_id: i32,
    pub servers: i32,
    pub clients: i32,
    pub resources: Vec<String>,
    pub host_types: Vec<String>,
    pub host_models: Vec<String>,
    pub admins: Vec<Admin>,
    pub analyzer_license: i32,
    pub job_scheduler_license: i32,
    pub after_hours_window: String,
    pub prefer_auth_name: String,
    pub in_use_auth_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedResourceInstanceView {
    pub value: Option<String>,
    pub hosts: Vec<String>,
}

/// A resource shared between hosts (`lsSharedResourceInfo`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedResourceView {
    pub name: Option<String>,
    pub instances: Vec<SharedResourceInstanceView>,
}

/// A cluster as read from its configuration (`clusterConf`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterView {
    pub info: Option<ClusterInfoView>,
    pub hosts: Vec<HostView>,
    pub default_features: LicenseFeatures,
    pub shared_resources: Vec<SharedResourceView>,
}

/// One resource definition (`resItem`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    pub name: String,
    pub description: String,
    pub value_type: ValueType,
    pub order_type: OrderType,
    pub flags: ResourceFlags,
    pub interval: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostModel {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    pub model_ref: i32,
    pub cpu_factor: f32,
}

/// Cluster-wide resource, type and model tables (`lsInfo`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogView {
    pub resources: Vec<ResourceDescriptor>,
    pub host_types: Vec<String>,
    pub host_models: Vec<HostModel>,
    pub num_indices: i32,
    pub num_user_indices: i32,
}

/// Hosts chosen for a task, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacementView {
    pub hosts: Vec<String>,
}

/// Resource usage of a finished task (`lsfRusage`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ResourceUsage {
    pub utime: f64,
    pub stime: f64,
    pub maxrss: f64,
    pub ixrss: f64,
    pub ismrss: f64,
    pub idrss: f64,
    pub isrss: f64,
    pub minflt: f64,
    pub majflt: f64,
    pub nswap: f64,
    pub inblock: f64,
    pub oublock: f64,
    pub ioch: f64,
    pub msgsnd: f64,
    pub msgrcv: f64,
    pub nsignals: f64,
    pub nvcsw: f64,
    pub nivcsw: f64,
    pub exutime: f64,
}

/// One task accounting record (`lsfAcctRec`).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AccountingRecordView {
    pub pid: i32,
    pub user: Option<String>,
    pub exit_status: i32,
    pub dispatch_time: i64,
    pub termination_time: i64,
    pub from_host: Option<String>,
    pub exec_host: Option<String>,
    pub cwd: Option<String>,
    pub command: Option<String>,
    pub usage: ResourceUsage,
}

/// Index of a node in a [`ConfTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfNodeView {
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    pub forward: Option<NodeId>,
    pub condition: Option<String>,
    pub begin_line: i32,
    pub lines: Vec<String>,
    pub tag: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfCondition {
    pub name: Option<String>,
    pub value: i32,
}

/// A parsed configuration file (`lsConf`), nodes stored in an arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfTree {
    pub file: Option<String>,
    pub line_count: i32,
    pub conditions: Vec<ConfCondition>,
    pub root: Option<NodeId>,
    pub nodes: Vec<ConfNodeView>,
}

impl ConfTree {
    pub fn node(&self, id: NodeId) -> Option<&ConfNodeView> {
        self.nodes.get(id.0)
    }
}
