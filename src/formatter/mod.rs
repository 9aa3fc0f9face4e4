use std::io::Write;

use crate::error::DecodeError;
use crate::views::{
    AccountingRecordView, CatalogView, ClusterInfoView, ClusterView, ConfTree, HostLoadView,
    HostView, PlacementView, SharedResourceView,
};

mod json;
mod plain;

pub use json::JsonFormatter;
pub use plain::PlainFormatter;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Plain,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(OutputFormat::Plain),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Renders decoded views. Sections group the records of one query.
pub trait OutputFormatter {
    fn begin_document(&mut self, w: &mut dyn Write) -> std::io::Result<()>;
    fn end_document(&mut self, w: &mut dyn Write) -> std::io::Result<()>;

    fn begin_section(&mut self, w: &mut dyn Write, title: &str) -> std::io::Result<()>;
    fn end_section(&mut self, w: &mut dyn Write) -> std::io::Result<()>;

    /// A named scalar such as the cluster or master name.
    fn value(&mut self, w: &mut dyn Write, name: &str, value: &str) -> std::io::Result<()>;

    fn host(&mut self, w: &mut dyn Write, host: &HostView) -> std::io::Result<()>;
    fn host_load(&mut self, w: &mut dyn Write, load: &HostLoadView) -> std::io::Result<()>;
    fn cluster_info(&mut self, w: &mut dyn Write, info: &ClusterInfoView) -> std::io::Result<()>;
    fn cluster(&mut self, w: &mut dyn Write, cluster: &ClusterView) -> std::io::Result<()>;
    fn shared_resource(&mut self, w: &mut dyn Write, resource: &SharedResourceView) -> std::io::Result<()>;
    fn catalog(&mut self, w: &mut dyn Write, catalog: &CatalogView) -> std::io::Result<()>;
    fn placement(&mut self, w: &mut dyn Write, placement: &PlacementView) -> std::io::Result<()>;
    fn accounting_record(&mut self, w: &mut dyn Write, record: &AccountingRecordView) -> std::io::Result<()>;
    fn conf_tree(&mut self, w: &mut dyn Write, tree: &ConfTree) -> std::io::Result<()>;

    /// A record of a batch that failed to decode.
    fn decode_failure(&mut self, w: &mut dyn Write, index: usize, error: &DecodeError) -> std::io::Result<()>;

    fn total(&mut self, w: &mut dyn Write, count: usize, failed: usize) -> std::io::Result<()>;
}

pub fn create_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Plain => Box::new(PlainFormatter::new()),
        OutputFormat::Json => Box::new(JsonFormatter::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!("plain".parse::<OutputFormat>(), Ok(OutputFormat::Plain));
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("rst".parse::<OutputFormat>().is_err());
    }
}
