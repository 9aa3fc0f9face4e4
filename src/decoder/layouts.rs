//! Byte layouts of every liblsf structure the decoder understands.

use std::sync::Arc;

use super::layout::{FieldKind, LayoutBuilder, StructLayout};
use crate::config::LayoutVersion;

// Constants for all structure field sizes
pub mod sizes {
    pub const MAX_HOSTNAME_LEN: usize = 64;
    pub const MAX_LSF_NAME_LEN: usize = 40;
    pub const MAX_LSF_NAME_LEN_70_EP1: usize = 128;
    pub const MAX_RES_DES_LEN: usize = 256;
    pub const MAX_TYPES: usize = 128;
    pub const MAX_MODELS: usize = 1026;
    pub const MAX_MODELS_70: usize = 128;
    pub const MAX_LINE_LEN: usize = 512;
    pub const INET6_ADDRSTRLEN: usize = 46;
}

use FieldKind::*;

fn host_info(version: LayoutVersion) -> StructLayout {
    let builder = LayoutBuilder::new("hostInfo").fields(&[
        ("hostName", Text(sizes::MAX_HOSTNAME_LEN)),
        ("hostType", Ptr),
        ("hostModel", Ptr),
        ("cpuFactor", F32),
        ("maxCpus", I32),
        ("maxMem", I32),
        ("maxSwap", I32),
        ("maxTmp", I32),
        ("nDisks", I32),
        ("nRes", I32),
        ("resources", Ptr),
        ("nDRes", I32),
        ("DResources", Ptr),
        ("windows", Ptr),
        ("numIndx", I32),
        ("busyThreshold", Ptr),
        ("isServer", U8),
        ("licensed", U8),
        ("rexPriority", I32),
        ("licFeaturesNeeded", I32),
    ]);
    match version {
        LayoutVersion::Lsf70 => builder.build(),
        LayoutVersion::Lsf706 => builder
            .fields(&[
                ("licClass", I32),
                ("cores", I32),
                ("hostAddr", Text(sizes::INET6_ADDRSTRLEN)),
                ("pprocs", I32),
                ("cores_per_proc", I32),
                ("threads_per_core", I32),
            ])
            .build(),
    }
}

fn cluster_info() -> StructLayout {
    LayoutBuilder::new("clusterInfo")
        .fields(&[
            ("clusterName", Text(sizes::MAX_LSF_NAME_LEN)),
            ("status", I32),
            ("masterName", Text(sizes::MAX_HOSTNAME_LEN)),
            ("managerName", Text(sizes::MAX_LSF_NAME_LEN)),
            ("managerId", I32),
            ("numServers", I32),
            ("numClients", I32),
            ("nRes", I32),
            ("resources", Ptr),
            ("nTypes", I32),
            ("hostTypes", Ptr),
            ("nModels", I32),
            ("hostModels", Ptr),
            ("nAdmins", I32),
            ("adminIds", Ptr),
            ("admins", Ptr),
            ("analyzerLicFlag", I32),
            ("jsLicFlag", I32),
            ("afterHoursWindow", Text(sizes::MAX_LINE_LEN)),
            ("preferAuthName", Text(sizes::MAX_LSF_NAME_LEN)),
            ("inUseAuthName", Text(sizes::MAX_LSF_NAME_LEN)),
        ])
        .build()
}

fn cluster_conf() -> StructLayout {
    LayoutBuilder::new("clusterConf")
        .fields(&[
            ("clinfo", Ptr),
            ("numHosts", I32),
            ("hosts", Ptr),
            ("defaultFeatures", I32),
            ("numShareRes", I32),
            ("shareRes", Ptr),
        ])
        .build()
}

fn shared_resource_info() -> StructLayout {
    LayoutBuilder::new("lsSharedResourceInfo")
        .fields(&[("resourceName", Ptr), ("nInstances", I32), ("instances", Ptr)])
        .build()
}

fn shared_resource_instance() -> StructLayout {
    LayoutBuilder::new("lsSharedResourceInstance")
        .fields(&[("value", Ptr), ("nHosts", I32), ("hostList", Ptr)])
        .build()
}

fn res_item() -> StructLayout {
    LayoutBuilder::new("resItem")
        .fields(&[
            ("name", Text(sizes::MAX_LSF_NAME_LEN)),
            ("des", Text(sizes::MAX_RES_DES_LEN)),
            ("valueType", I32),
            ("orderType", I32),
            ("flags", I32),
            ("interval", I32),
        ])
        .build()
}

fn ls_info(version: LayoutVersion) -> StructLayout {
    let models = version.max_models();
    let builder = LayoutBuilder::new("lsInfo").fields(&[
        ("nRes", I32),
        ("resTable", Ptr),
        ("nTypes", I32),
        ("hostTypes", TextArray { len: sizes::MAX_LSF_NAME_LEN, count: sizes::MAX_TYPES }),
        ("nModels", I32),
        ("hostModels", TextArray { len: sizes::MAX_LSF_NAME_LEN, count: models }),
    ]);
    let builder = match version {
        LayoutVersion::Lsf70 => builder,
        LayoutVersion::Lsf706 => builder.field(
            "hostArchs",
            TextArray { len: sizes::MAX_LSF_NAME_LEN_70_EP1, count: models },
        ),
    };
    builder
        .fields(&[
            ("modelRefs", I32Array(models)),
            ("cpuFactor", F32Array(models)),
            ("numIndx", I32),
            ("numUsrIndx", I32),
        ])
        .build()
}

fn host_load() -> StructLayout {
    LayoutBuilder::new("hostLoad")
        .fields(&[
            ("hostName", Text(sizes::MAX_HOSTNAME_LEN)),
            ("status", Ptr),
            ("li", Ptr),
        ])
        .build()
}

/// Field names of `lsfRusage`, all doubles, in declaration order.
pub const RUSAGE_FIELDS: [&str; 19] = [
    "ru_utime",
    "ru_stime",
    "ru_maxrss",
    "ru_ixrss",
    "ru_ismrss",
    "ru_idrss",
    "ru_isrss",
    "ru_minflt",
    "ru_majflt",
    "ru_nswap",
    "ru_inblock",
    "ru_oublock",
    "ru_ioch",
    "ru_msgsnd",
    "ru_msgrcv",
    "ru_nsignals",
    "ru_nvcsw",
    "ru_nivcsw",
    "ru_exutime",
];

fn lsf_rusage() -> StructLayout {
    RUSAGE_FIELDS
        .iter()
        .fold(LayoutBuilder::new("lsfRusage"), |b, &name| b.field(name, F64))
        .build()
}

fn lsf_acct_rec(rusage: &StructLayout) -> StructLayout {
    LayoutBuilder::new("lsfAcctRec")
        .fields(&[
            ("pid", I32),
            ("username", Ptr),
            ("exitStatus", I32),
            ("dispTime", Long),
            ("termTime", Long),
            ("fromHost", Ptr),
            ("execHost", Ptr),
            ("cwd", Ptr),
            ("cmdln", Ptr),
            ("lsfRu", rusage.embedded()),
        ])
        .build()
}

fn ls_conf() -> StructLayout {
    LayoutBuilder::new("lsConf")
        .fields(&[
            ("confhandle", Ptr),
            ("numConds", I32),
            ("conds", Ptr),
            ("values", Ptr),
        ])
        .build()
}

fn conf_handle() -> StructLayout {
    LayoutBuilder::new("confHandle")
        .fields(&[
            ("rootNode", Ptr),
            ("fname", Ptr),
            ("curNode", Ptr),
            ("lineCount", I32),
            ("ptrStack", Ptr),
        ])
        .build()
}

fn conf_node() -> StructLayout {
    LayoutBuilder::new("confNode")
        .fields(&[
            ("leftPtr", Ptr),
            ("rightPtr", Ptr),
            ("fwPtr", Ptr),
            ("cond", Ptr),
            ("beginLineNum", I32),
            ("numLines", I32),
            ("lines", Ptr),
            ("tag", U8),
        ])
        .build()
}

/// All structure layouts for one library revision.
#[derive(Debug, Clone)]
pub struct Layouts {
    pub version: LayoutVersion,
    pub host_info: Arc<StructLayout>,
    pub cluster_info: Arc<StructLayout>,
    pub cluster_conf: Arc<StructLayout>,
    pub shared_resource_info: Arc<StructLayout>,
    pub shared_resource_instance: Arc<StructLayout>,
    pub res_item: Arc<StructLayout>,
    pub ls_info: Arc<StructLayout>,
    pub host_load: Arc<StructLayout>,
    pub lsf_rusage: Arc<StructLayout>,
    pub lsf_acct_rec: Arc<StructLayout>,
    pub ls_conf: Arc<StructLayout>,
    pub conf_handle: Arc<StructLayout>,
    pub conf_node: Arc<StructLayout>,
}

impl Layouts {
    pub fn for_version(version: LayoutVersion) -> Self {
        let rusage = lsf_rusage();
        Self {
            version,
            host_info: Arc::new(host_info(version)),
            cluster_info: Arc::new(cluster_info()),
            cluster_conf: Arc::new(cluster_conf()),
            shared_resource_info: Arc::new(shared_resource_info()),
            shared_resource_instance: Arc::new(shared_resource_instance()),
            res_item: Arc::new(res_item()),
            ls_info: Arc::new(ls_info(version)),
            host_load: Arc::new(host_load()),
            lsf_acct_rec: Arc::new(lsf_acct_rec(&rusage)),
            lsf_rusage: Arc::new(rusage),
            ls_conf: Arc::new(ls_conf()),
            conf_handle: Arc::new(conf_handle()),
            conf_node: Arc::new(conf_node()),
        }
    }
}
