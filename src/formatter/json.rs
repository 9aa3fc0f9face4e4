use super::OutputFormatter;
use std::io::Write;
use serde::Serialize;
use serde_json::Value;
use crate::error::DecodeError;
use crate::views::{
    AccountingRecordView, CatalogView, ClusterInfoView, ClusterView, ConfTree, HostLoadView,
    HostView, PlacementView, SharedResourceView,
};

pub struct JsonFormatter {
    data: JsonData,
}

#[derive(Serialize, Default)]
struct JsonData {
    sections: Vec<JsonSection>,
}

#[derive(Serialize, Default)]
struct JsonSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    values: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    records: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<JsonFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<usize>,
}

#[derive(Serialize)]
struct JsonFailure {
    index: usize,
    error: String,
}

impl JsonFormatter {
    pub fn new() -> Self {
        JsonFormatter { data: JsonData::default() }
    }

    fn section(&mut self) -> &mut JsonSection {
        if self.data.sections.is_empty() {
            self.data.sections.push(JsonSection::default());
        }
        let last = self.data.sections.len() - 1;
        &mut self.data.sections[last]
    }

    fn record(&mut self, view: &impl Serialize) -> std::io::Result<()> {
        let value = serde_json::to_value(view)?;
        self.section().records.push(value);
        Ok(())
    }
}

impl OutputFormatter for JsonFormatter {
    fn begin_document(&mut self, _w: &mut dyn Write) -> std::io::Result<()> {
        Ok(())
    }

    fn end_document(&mut self, w: &mut dyn Write) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.data)?;
        writeln!(w, "{json}")?;
        Ok(())
    }

    fn begin_section(&mut self, _w: &mut dyn Write, title: &str) -> std::io::Result<()> {
        self.data.sections.push(JsonSection { title: Some(title.to_string()), ..JsonSection::default() });
        Ok(())
    }

    fn end_section(&mut self, _w: &mut dyn Write) -> std::io::Result<()> {
        Ok(())
    }

    fn value(&mut self, _w: &mut dyn Write, name: &str, value: &str) -> std::io::Result<()> {
        self.section().values.insert(name.to_string(), Value::String(value.to_string()));
        Ok(())
    }

    fn host(&mut self, _w: &mut dyn Write, host: &HostView) -> std::io::Result<()> {
        self.record(host)
    }

    fn host_load(&mut self, _w: &mut dyn Write, load: &HostLoadView) -> std::io::Result<()> {
        self.record(load)
    }

    fn cluster_info(&mut self, _w: &mut dyn Write, info: &ClusterInfoView) -> std::io::Result<()> {
        self.record(info)
    }

    fn cluster(&mut self, _w: &mut dyn Write, cluster: &ClusterView) -> std::io::Result<()> {
        self.record(cluster)
    }

    fn shared_resource(&mut self, _w: &mut dyn Write, resource: &SharedResourceView) -> std::io::Result<()> {
        self.record(resource)
    }

    fn catalog(&mut self, _w: &mut dyn Write, catalog: &CatalogView) -> std::io::Result<()> {
        self.record(catalog)
    }

    fn placement(&mut self, _w: &mut dyn Write, placement: &PlacementView) -> std::io::Result<()> {
        self.record(placement)
    }

    fn accounting_record(&mut self, _w: &mut dyn Write, record: &AccountingRecordView) -> std::io::Result<()> {
        self.record(record)
    }

    fn conf_tree(&mut self, _w: &mut dyn Write, tree: &ConfTree) -> std::io::Result<()> {
        self.record(tree)
    }

    fn decode_failure(&mut self, _w: &mut dyn Write, index: usize, error: &DecodeError) -> std::io::Result<()> {
        self.section().failures.push(JsonFailure { index, error: error.to_string() });
        Ok(())
    }

    fn total(&mut self, _w: &mut dyn Write, count: usize, _failed: usize) -> std::io::Result<()> {
        self.section().total = Some(count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::PlacementView;

    #[test]
    fn test_document_collects_sections() {
        let mut out = Vec::new();
        let mut f = JsonFormatter::new();
        f.begin_document(&mut out).unwrap();
        f.value(&mut out, "cluster", "prod").unwrap();
        f.begin_section(&mut out, "Placement").unwrap();
        f.placement(&mut out, &PlacementView { hosts: vec!["hostB".into(), "hostA".into()] }).unwrap();
        f.decode_failure(&mut out, 1, &DecodeError::InvalidText { field: "hostName" }).unwrap();
        f.total(&mut out, 2, 1).unwrap();
        f.end_section(&mut out).unwrap();
        assert!(out.is_empty());
        f.end_document(&mut out).unwrap();

        let doc: Value = serde_json::from_slice(&out).unwrap();
        let sections = doc["sections"].as_array().unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0]["values"]["cluster"], "prod");
        assert_eq!(sections[1]["title"], "Placement");
        assert_eq!(sections[1]["records"][0]["hosts"][0], "hostB");
        assert_eq!(sections[1]["failures"][0]["index"], 1);
        assert_eq!(sections[1]["total"], 2);
    }
}
