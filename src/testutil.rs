//! Writes synthetic native structures into a [`MemoryImage`].

use std::ffi::c_long;

use crate::decoder::{FieldKind, Layouts, MemoryImage, NativeAddr, StructLayout};

/// Address that must never be read; any read of it fails.
pub const POISON: NativeAddr = NativeAddr(0xdead_beef_0000);

pub struct StructWriter<'a> {
    layout: &'a StructLayout,
    bytes: Vec<u8>,
}

impl<'a> StructWriter<'a> {
    pub fn new(layout: &'a StructLayout) -> Self {
        Self { layout, bytes: vec![0; layout.size] }
    }

    fn put(mut self, name: &'static str, at: usize, data: &[u8]) -> Self {
        let field = self.layout.field(name).unwrap();
        assert!(at + data.len() <= field.kind.size(), "{name} overflows its field");
        let start = field.offset + at;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        self
    }

    pub fn i32(self, name: &'static str, value: i32) -> Self {
        self.put(name, 0, &value.to_ne_bytes())
    }

    pub fn u8(self, name: &'static str, value: u8) -> Self {
        self.put(name, 0, &[value])
    }

    pub fn f32(self, name: &'static str, value: f32) -> Self {
        self.put(name, 0, &value.to_ne_bytes())
    }

    pub fn f64(self, name: &'static str, value: f64) -> Self {
        self.put(name, 0, &value.to_ne_bytes())
    }

    pub fn long(self, name: &'static str, value: i64) -> Self {
        self.put(name, 0, &(value as c_long).to_ne_bytes())
    }

    pub fn ptr(self, name: &'static str, addr: NativeAddr) -> Self {
        self.put(name, 0, &addr.to_ptr_bytes())
    }

    pub fn text(self, name: &'static str, value: &str) -> Self {
        self.put(name, 0, value.as_bytes())
    }

    pub fn text_row(self, name: &'static str, row: usize, value: &str) -> Self {
        let FieldKind::TextArray { len, .. } = self.layout.field(name).unwrap().kind else {
            panic!("{name} is not a char table");
        };
        self.put(name, row * len, value.as_bytes())
    }

    pub fn i32_at(self, name: &'static str, index: usize, value: i32) -> Self {
        self.put(name, index * 4, &value.to_ne_bytes())
    }

    pub fn f32_at(self, name: &'static str, index: usize, value: f32) -> Self {
        self.put(name, index * 4, &value.to_ne_bytes())
    }

    pub fn bytes(self, name: &'static str, data: &[u8]) -> Self {
        self.put(name, 0, data)
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

pub fn cstr(memory: &mut MemoryImage, value: &str) -> NativeAddr {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    memory.alloc(bytes)
}

pub fn ptr_table(memory: &mut MemoryImage, addrs: &[NativeAddr]) -> NativeAddr {
    memory.alloc(addrs.iter().flat_map(|a| a.to_ptr_bytes()).collect())
}

pub fn str_table(memory: &mut MemoryImage, values: &[&str]) -> NativeAddr {
    let addrs: Vec<_> = values.iter().map(|v| cstr(memory, v)).collect();
    ptr_table(memory, &addrs)
}

pub fn i32_table(memory: &mut MemoryImage, values: &[i32]) -> NativeAddr {
    memory.alloc(values.iter().flat_map(|v| v.to_ne_bytes()).collect())
}

pub fn f32_table(memory: &mut MemoryImage, values: &[f32]) -> NativeAddr {
    memory.alloc(values.iter().flat_map(|v| v.to_ne_bytes()).collect())
}

pub fn struct_table(memory: &mut MemoryImage, items: &[Vec<u8>]) -> NativeAddr {
    memory.alloc(items.concat())
}

/// A `hostInfo` with a stale `DResources` pointer behind a zero count.
pub fn host_info(
    memory: &mut MemoryImage,
    layouts: &Layouts,
    name: &str,
    resources: &[&str],
    thresholds: &[f32],
) -> Vec<u8> {
    let host_type = cstr(memory, "LINUX64");
    let model = cstr(memory, "X86_64");
    let resource_table = str_table(memory, resources);
    let threshold_table = f32_table(memory, thresholds);

    let writer = StructWriter::new(&layouts.host_info)
        .text("hostName", name)
        .ptr("hostType", host_type)
        .ptr("hostModel", model)
        .f32("cpuFactor", 60.0)
        .i32("maxCpus", 8)
        .i32("maxMem", 16_000)
        .i32("maxSwap", 4_000)
        .i32("maxTmp", 20_000)
        .i32("nDisks", 1)
        .i32("nRes", resources.len() as i32)
        .ptr("resources", resource_table)
        .i32("nDRes", 0)
        .ptr("DResources", POISON)
        .ptr("windows", NativeAddr::NULL)
        .i32("numIndx", thresholds.len() as i32)
        .ptr("busyThreshold", threshold_table)
        .u8("isServer", 1)
        .u8("licensed", 1)
        .i32("rexPriority", 0)
        .i32("licFeaturesNeeded", 1 << 21);

    if layouts.host_info.has("cores") {
        writer
            .i32("licClass", 2)
            .i32("cores", 4)
            .text("hostAddr", "10.0.0.7")
            .i32("pprocs", 1)
            .i32("cores_per_proc", 4)
            .i32("threads_per_core", 2)
            .finish()
    } else {
        writer.finish()
    }
}

/// An `lsSharedResourceInfo` with one instance per `(value, hosts)` pair.
pub fn shared_resource(
    memory: &mut MemoryImage,
    layouts: &Layouts,
    name: &str,
    instances: &[(&str, &[&str])],
) -> Vec<u8> {
    let items: Vec<_> = instances
        .iter()
        .map(|(value, hosts)| {
            let value = cstr(memory, value);
            let list = str_table(memory, hosts);
            StructWriter::new(&layouts.shared_resource_instance)
                .ptr("value", value)
                .i32("nHosts", hosts.len() as i32)
                .ptr("hostList", list)
                .finish()
        })
        .collect();
    let table = struct_table(memory, &items);
    let name = cstr(memory, name);
    StructWriter::new(&layouts.shared_resource_info)
        .ptr("resourceName", name)
        .i32("nInstances", instances.len() as i32)
        .ptr("instances", table)
        .finish()
}

/// A `clusterInfo` with the given resources and admins.
pub fn cluster_info(
    memory: &mut MemoryImage,
    layouts: &Layouts,
    name: &str,
    resources: &[&str],
    admins: &[(i32, &str)],
) -> Vec<u8> {
    let resource_table = str_table(memory, resources);
    let ids: Vec<i32> = admins.iter().map(|(id, _)| *id).collect();
    let names: Vec<&str> = admins.iter().map(|(_, name)| *name).collect();
    let id_table = i32_table(memory, &ids);
    let name_table = str_table(memory, &names);

    StructWriter::new(&layouts.cluster_info)
        .text("clusterName", name)
        .i32("status", 0x01 | 0x08)
        .text("masterName", "hostA")
        .text("managerName", "lsfadmin")
        .i32("managerId", 500)
        .i32("numServers", 2)
        .i32("numClients", 0)
        .i32("nRes", resources.len() as i32)
        .ptr("resources", resource_table)
        .i32("nTypes", 0)
        .ptr("hostTypes", POISON)
        .i32("nModels", 0)
        .ptr("hostModels", NativeAddr::NULL)
        .i32("nAdmins", admins.len() as i32)
        .ptr("adminIds", id_table)
        .ptr("admins", name_table)
        .text("afterHoursWindow", "19:00-7:00")
        .finish()
}
