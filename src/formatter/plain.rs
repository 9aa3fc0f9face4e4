use super::OutputFormatter;
use std::io::Write;
use crate::error::DecodeError;
use crate::views::{
    AccountingRecordView, CatalogView, ClusterInfoView, ClusterView, ConfTree, HostLoadView,
    HostView, PlacementView, SharedResourceView,
};

pub struct PlainFormatter;

impl PlainFormatter {
    pub fn new() -> Self {
        PlainFormatter
    }
}

fn or_dash(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

fn list(values: &[String]) -> String {
    if values.is_empty() { "-".to_string() } else { values.join(" ") }
}

impl OutputFormatter for PlainFormatter {
    fn begin_document(&mut self, _w: &mut dyn Write) -> std::io::Result<()> {
        Ok(())
    }

    fn end_document(&mut self, _w: &mut dyn Write) -> std::io::Result<()> {
        Ok(())
    }

    fn begin_section(&mut self, w: &mut dyn Write, title: &str) -> std::io::Result<()> {
        writeln!(w, "\n{title}:")?;
        writeln!(w, "{}", "-".repeat(title.len() + 1))
    }

    fn end_section(&mut self, _w: &mut dyn Write) -> std::io::Result<()> {
        Ok(())
    }

    fn value(&mut self, w: &mut dyn Write, name: &str, value: &str) -> std::io::Result<()> {
        writeln!(w, "{name}: {value}")
    }

    fn host(&mut self, w: &mut dyn Write, host: &HostView) -> std::io::Result<()> {
        writeln!(
            w,
            "{} type={} model={} cpuf={:.1}{}",
            host.name,
            or_dash(&host.host_type),
            or_dash(&host.model),
            host.cpu_factor,
            if host.is_server { "" } else { " (client)" }
        )?;
        writeln!(
            w,
            "  ncpus={} maxmem={}M maxswp={}M maxtmp={}M ndisks={}",
            host.max_cpus, host.max_mem, host.max_swap, host.max_tmp, host.disks
        )?;
        writeln!(w, "  resources: {}", list(&host.resources))?;
        if !host.dynamic_resources.is_empty() {
            writeln!(w, "  dynamic: {}", list(&host.dynamic_resources))?;
        }
        if let Some(windows) = &host.windows {
            writeln!(w, "  windows: {windows}")?;
        }
        if let Some(topology) = &host.topology {
            writeln!(
                w,
                "  topology: {} procs x {} cores x {} threads, addr {}",
                topology.processors, topology.cores_per_processor, topology.threads_per_core, topology.address
            )?;
        }
        Ok(())
    }

    fn host_load(&mut self, w: &mut dyn Write, load: &HostLoadView) -> std::io::Result<()> {
        let status = load.status.names();
        let status = if status.is_empty() { "unknown".to_string() } else { status.join(",") };
        let values: Vec<String> = if load.index_names.len() == load.load.len() {
            load.named_load().map(|(name, v)| format!("{name}={v:.1}")).collect()
        } else {
            load.load.iter().map(|v| format!("{v:.1}")).collect()
        };
        writeln!(w, "{:<20} {:<16} {}", load.name, status, values.join(" "))?;
        if !load.busy_on.is_empty() {
            let busy: Vec<String> = load.busy_on.iter().map(usize::to_string).collect();
            writeln!(w, "  busy on: {}", busy.join(" "))?;
        }
        Ok(())
    }

    fn cluster_info(&mut self, w: &mut dyn Write, info: &ClusterInfoView) -> std::io::Result<()> {
        writeln!(
            w,
            "{} [{}] master={} admin={} servers={} clients={}",
            info.name,
            info.status.names().join(","),
            info.master,
            info.manager_name,
            info.servers,
            info.clients
        )?;
        writeln!(w, "  resources: {}", list(&info.resources))?;
        if !info.host_types.is_empty() {
            writeln!(w, "  types: {}", list(&info.host_types))?;
        }
        if !info.host_models.is_empty() {
            writeln!(w, "  models: {}", list(&info.host_models))?;
        }
        for admin in &info.admins {
            writeln!(w, "  admin {} ({})", admin.name.as_deref().unwrap_or("?"), admin.id)?;
        }
        Ok(())
    }

    fn cluster(&mut self, w: &mut dyn Write, cluster: &ClusterView) -> std::io::Result<()> {
        if let Some(info) = &cluster.info {
            self.cluster_info(w, info)?;
        }
        writeln!(w, "Hosts ({}):", cluster.hosts.len())?;
        for host in &cluster.hosts {
            self.host(w, host)?;
        }
        writeln!(w, "Shared resources ({}):", cluster.shared_resources.len())?;
        for resource in &cluster.shared_resources {
            self.shared_resource(w, resource)?;
        }
        Ok(())
    }

    fn shared_resource(&mut self, w: &mut dyn Write, resource: &SharedResourceView) -> std::io::Result<()> {
        writeln!(w, "{}", or_dash(&resource.name))?;
        for instance in &resource.instances {
            writeln!(w, "  {} on {}", or_dash(&instance.value), list(&instance.hosts))?;
        }
        Ok(())
    }

    fn catalog(&mut self, w: &mut dyn Write, catalog: &CatalogView) -> std::io::Result<()> {
        writeln!(
            w,
            "Load indices: {} ({} user defined)",
            catalog.num_indices, catalog.num_user_indices
        )?;
        writeln!(w, "\nResources ({}):", catalog.resources.len())?;
        for res in &catalog.resources {
            writeln!(
                w,
                "  {:<12} {:?}/{:?} [{}] {}",
                res.name,
                res.value_type,
                res.order_type,
                res.flags.names().join(","),
                res.description
            )?;
        }
        writeln!(w, "\nHost types: {}", list(&catalog.host_types))?;
        writeln!(w, "\nHost models ({}):", catalog.host_models.len())?;
        for model in &catalog.host_models {
            writeln!(
                w,
                "  {:<16} {:<16} cpuf={:.1}",
                model.name,
                model.arch.as_deref().unwrap_or("-"),
                model.cpu_factor
            )?;
        }
        Ok(())
    }

    fn placement(&mut self, w: &mut dyn Write, placement: &PlacementView) -> std::io::Result<()> {
        writeln!(w, "{}", list(&placement.hosts))
    }

    fn accounting_record(&mut self, w: &mut dyn Write, record: &AccountingRecordView) -> std::io::Result<()> {
        writeln!(
            w,
            "pid {} user {} exit {} on {} ({}s): {}",
            record.pid,
            or_dash(&record.user),
            record.exit_status,
            or_dash(&record.exec_host),
            record.termination_time.saturating_sub(record.dispatch_time),
            or_dash(&record.command)
        )?;
        writeln!(
            w,
            "  utime={:.2} stime={:.2} maxrss={}",
            record.usage.utime, record.usage.stime, record.usage.maxrss
        )
    }

    fn conf_tree(&mut self, w: &mut dyn Write, tree: &ConfTree) -> std::io::Result<()> {
        writeln!(w, "File: {} ({} lines)", or_dash(&tree.file), tree.line_count)?;
        for cond in &tree.conditions {
            writeln!(w, "  condition {} = {}", cond.name.as_deref().unwrap_or("?"), cond.value)?;
        }
        for (id, node) in tree.nodes.iter().enumerate() {
            let link = |n: Option<crate::views::NodeId>| n.map_or("-".to_string(), |n| n.0.to_string());
            writeln!(
                w,
                "  [{id}] line {} left={} right={} fw={} {}",
                node.begin_line,
                link(node.left),
                link(node.right),
                link(node.forward),
                or_dash(&node.condition)
            )?;
            for line in &node.lines {
                writeln!(w, "      {line}")?;
            }
        }
        Ok(())
    }

    fn decode_failure(&mut self, w: &mut dyn Write, index: usize, error: &DecodeError) -> std::io::Result<()> {
        writeln!(w, "record {index}: decode failed: {error}")
    }

    fn total(&mut self, w: &mut dyn Write, count: usize, failed: usize) -> std::io::Result<()> {
        if failed == 0 {
            writeln!(w, "\nTotal records: {count}")
        } else {
            writeln!(w, "\nTotal records: {count} ({failed} failed to decode)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::HostStatus;

    #[test]
    fn test_host_load_line() {
        let mut status = vec![0u32; 2];
        status[1] = 1 << 2;
        let load = HostLoadView {
            name: "hostA".into(),
            busy_on: vec![2],
            status: HostStatus::new(status, 3),
            index_names: vec!["r15s".into(), "r1m".into(), "ut".into()],
            load: vec![0.5, 1.0, 2.0],
        };
        let mut out = Vec::new();
        PlainFormatter::new().host_load(&mut out, &load).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("hostA"), "{text}");
        assert!(text.contains("ok"), "{text}");
        assert!(text.contains("r15s=0.5 r1m=1.0 ut=2.0"), "{text}");
        assert!(text.contains("busy on: 2"), "{text}");
    }

    #[test]
    fn test_accounting_record_with_garbage_times() {
        let record = AccountingRecordView {
            termination_time: i64::MIN,
            dispatch_time: i64::MAX,
            ..AccountingRecordView::default()
        };
        let mut out = Vec::new();
        PlainFormatter::new().accounting_record(&mut out, &record).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(&format!("({}s)", i64::MIN)), "{text}");
    }

    #[test]
    fn test_failure_and_total() {
        let mut out = Vec::new();
        let mut f = PlainFormatter::new();
        f.decode_failure(&mut out, 1, &DecodeError::InconsistentCount { field: "resources", count: 1 })
            .unwrap();
        f.total(&mut out, 3, 1).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("record 1: decode failed"), "{text}");
        assert!(text.contains("Total records: 3 (1 failed to decode)"), "{text}");
    }
}
