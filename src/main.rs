//! lsfview - LSF base library result viewer
//!
//! Queries the LSF base library, or replays a captured snapshot of its
//! results, and prints the decoded hosts, load, clusters, resources,
//! placements, accounting records and configuration trees.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use regex::Regex;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lsfview::config::{DecoderConfig, LayoutVersion};
use lsfview::error::DecodeError;
use lsfview::formatter::{OutputFormat, OutputFormatter, create_formatter};
use lsfview::status::options;
use lsfview::surface::{NativeSurface, Session, SnapshotSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Query {
    /// Name of the local cluster
    ClusterName,
    /// Name of the master host
    MasterName,
    /// Static host configuration (ls_gethostinfo)
    Hosts,
    /// Clusters known to the local one (ls_clusterinfo)
    Clusters,
    /// Host load and status (ls_load)
    Load,
    /// Resource, host type and model tables (ls_info)
    Info,
    /// Load index names (ls_indexnames)
    IndexNames,
    /// Type of a host, the local one by default (ls_gethosttype)
    HostType,
    /// Model of a host, the local one by default (ls_gethostmodel)
    HostModel,
    /// CPU factor of a host, the local one by default (ls_gethostfactor)
    HostFactor,
    /// Hosts chosen for a task (ls_placereq)
    Place,
    /// Shared resources (ls_sharedresourceinfo)
    Shared,
    /// A cluster configuration file (ls_readcluster)
    Cluster,
    /// A parsed configuration file (ls_getconf)
    Conf,
    /// Records of an accounting file (ls_getacctrec)
    Acct,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Snapshot file, or directory of snapshot files, to replay
    #[arg(long, value_name = "PATH", group = "input")]
    snapshot: Option<PathBuf>,

    /// Query the linked liblsf
    #[arg(long, group = "input")]
    live: bool,

    /// Native structure layout revision
    #[arg(long, env = "LSF_LAYOUT")]
    layout: Option<LayoutVersion>,

    /// Largest element count accepted for any array
    #[arg(long, value_name = "N")]
    max_elements: Option<usize>,

    /// Longest string followed through a pointer
    #[arg(long, value_name = "BYTES")]
    max_string_len: Option<usize>,

    /// What to query
    #[arg(value_enum)]
    query: Query,

    /// Resource requirement string
    #[arg(long)]
    resreq: Option<String>,

    /// Restrict to this host or cluster (repeatable)
    #[arg(long = "host", value_name = "NAME")]
    hosts: Vec<String>,

    /// Only these shared resources (repeatable)
    #[arg(long = "resource", value_name = "NAME")]
    resources: Vec<String>,

    /// Number of hosts to place
    #[arg(long, default_value_t = 1)]
    num_hosts: i32,

    /// Host the request is made on behalf of
    #[arg(long)]
    from_host: Option<String>,

    /// Only hosts that are ok
    #[arg(long)]
    ok_only: bool,

    /// Configuration or accounting file
    #[arg(long, value_name = "PATH")]
    file: Option<String>,

    /// Only print records whose name matches
    #[arg(long = "match", value_name = "REGEX")]
    pattern: Option<String>,

    /// Output format
    #[arg(long, short = 'f', default_value = "plain")]
    format: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let output_format: OutputFormat = args.format.parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let pattern = args
        .pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid --match pattern")?;

    let surface = open_surface(&args)?;
    let mut config = DecoderConfig::default();
    config.layout = args.layout.or(surface.layout_hint()).unwrap_or_default();
    if let Some(n) = args.max_elements {
        config.max_elements = n;
    }
    if let Some(n) = args.max_string_len {
        config.max_string_len = n;
    }
    tracing::debug!(surface = surface.name(), layout = config.layout.as_str(), "session ready");

    let session = Session::new(surface, config);
    let mut formatter = create_formatter(output_format);
    let mut stdout = io::stdout();

    formatter.begin_document(&mut stdout)?;
    display(&session, &args, pattern.as_ref(), &mut *formatter, &mut stdout)?;
    formatter.end_document(&mut stdout)?;
    Ok(())
}

fn open_surface(args: &Args) -> Result<Box<dyn NativeSurface>> {
    if let Some(path) = &args.snapshot {
        let surface = SnapshotSurface::open(path)
            .with_context(|| format!("loading snapshot {}", path.display()))?;
        return Ok(Box::new(surface));
    }
    if args.live {
        return live_surface();
    }
    anyhow::bail!("Please specify one of --snapshot or --live")
}

#[cfg(feature = "liblsf")]
fn live_surface() -> Result<Box<dyn NativeSurface>> {
    let surface = lsfview::surface::LiveSurface::new().context("initialising liblsf")?;
    Ok(Box::new(surface))
}

#[cfg(not(feature = "liblsf"))]
fn live_surface() -> Result<Box<dyn NativeSurface>> {
    Err(lsfview::error::Error::Unsupported { surface: "this build", request: "--live (needs feature liblsf)" }.into())
}

fn required_file(args: &Args) -> Result<String> {
    args.file.clone().context("this query needs --file")
}

fn matches(pattern: Option<&Regex>, name: &str) -> bool {
    pattern.is_none_or(|re| re.is_match(name))
}

/// Prints one batch, skipping records the pattern rejects. Failed records
/// are always reported.
fn render_batch<V>(
    formatter: &mut dyn OutputFormatter,
    w: &mut dyn Write,
    title: &str,
    batch: Vec<std::result::Result<V, DecodeError>>,
    pattern: Option<&Regex>,
    name: impl Fn(&V) -> &str,
    mut emit: impl FnMut(&mut dyn OutputFormatter, &mut dyn Write, &V) -> io::Result<()>,
) -> Result<()> {
    formatter.begin_section(w, title)?;
    let mut shown = 0;
    let mut failed = 0;
    for (index, record) in batch.iter().enumerate() {
        match record {
            Ok(view) if matches(pattern, name(view)) => {
                emit(formatter, w, view)?;
                shown += 1;
            }
            Ok(_) => {}
            Err(error) => {
                formatter.decode_failure(w, index, error)?;
                failed += 1;
            }
        }
    }
    formatter.total(w, shown + failed, failed)?;
    formatter.end_section(w)?;
    Ok(())
}

fn display(
    session: &Session,
    args: &Args,
    pattern: Option<&Regex>,
    formatter: &mut dyn OutputFormatter,
    w: &mut dyn Write,
) -> Result<()> {
    let options = if args.ok_only { options::OK_ONLY } else { 0 };

    match args.query {
        Query::ClusterName => {
            let name = session.cluster_name().context("ls_getclustername")?;
            formatter.value(w, "cluster", &name)?;
        }
        Query::MasterName => {
            let name = session.master_name().context("ls_getmastername")?;
            formatter.value(w, "master", &name)?;
        }
        Query::Hosts => {
            let hosts = session.hosts(args.resreq.clone(), args.hosts.clone(), options)?;
            render_batch(formatter, w, "Hosts", hosts, pattern, |h| h.name.as_str(), |f, w, h| f.host(w, h))?;
        }
        Query::Clusters => {
            let clusters = session.clusters(args.resreq.clone(), args.hosts.clone(), options)?;
            render_batch(formatter, w, "Clusters", clusters, pattern, |c| c.name.as_str(), |f, w, c| {
                f.cluster_info(w, c)
            })?;
        }
        Query::Load => {
            let loads = session.load(args.resreq.clone(), args.hosts.clone(), options, args.from_host.clone())?;
            render_batch(formatter, w, "Load", loads, pattern, |l| l.name.as_str(), |f, w, l| f.host_load(w, l))?;
        }
        Query::Info => {
            let catalog = session.info()?;
            formatter.begin_section(w, "Cluster catalog")?;
            formatter.catalog(w, &catalog)?;
            formatter.end_section(w)?;
        }
        Query::IndexNames => {
            let names = session.index_names()?;
            formatter.begin_section(w, "Load indices")?;
            for (index, name) in names.iter().enumerate().filter(|(_, n)| matches(pattern, n)) {
                formatter.value(w, &index.to_string(), name)?;
            }
            formatter.end_section(w)?;
        }
        Query::HostType => {
            let host_type = session.host_type(args.hosts.first().cloned()).context("ls_gethosttype")?;
            formatter.value(w, "type", &host_type)?;
        }
        Query::HostModel => {
            let model = session.host_model(args.hosts.first().cloned()).context("ls_gethostmodel")?;
            formatter.value(w, "model", &model)?;
        }
        Query::HostFactor => {
            let factor = session.host_factor(args.hosts.first().cloned()).context("ls_gethostfactor")?;
            formatter.value(w, "cpuf", &format!("{factor:.1}"))?;
        }
        Query::Place => {
            let mut placement =
                session.place(args.resreq.clone(), args.num_hosts, options, args.from_host.clone())?;
            placement.hosts.retain(|h| matches(pattern, h));
            formatter.begin_section(w, "Placement")?;
            formatter.placement(w, &placement)?;
            formatter.end_section(w)?;
        }
        Query::Shared => {
            let host = args.hosts.first().cloned();
            let resources = session.shared_resources(args.resources.clone(), host)?;
            render_batch(
                formatter,
                w,
                "Shared resources",
                resources,
                pattern,
                |r| r.name.as_deref().unwrap_or_default(),
                |f, w, r| f.shared_resource(w, r),
            )?;
        }
        Query::Cluster => {
            let file = required_file(args)?;
            let cluster = session.cluster(file.clone()).with_context(|| format!("reading cluster file {file}"))?;
            formatter.begin_section(w, "Cluster")?;
            formatter.cluster(w, &cluster)?;
            formatter.end_section(w)?;
        }
        Query::Conf => {
            let file = required_file(args)?;
            let tree = session.conf(file.clone()).with_context(|| format!("reading configuration {file}"))?;
            formatter.begin_section(w, "Configuration")?;
            formatter.conf_tree(w, &tree)?;
            formatter.end_section(w)?;
        }
        Query::Acct => {
            let file = required_file(args)?;
            let records = session.accounting_records(file.clone()).with_context(|| format!("reading {file}"))?;
            render_batch(
                formatter,
                w,
                "Accounting records",
                records,
                pattern,
                |r| r.exec_host.as_deref().unwrap_or_default(),
                |f, w, r| f.accounting_record(w, r),
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_shared_query_takes_resource_filter() {
        let args = Args::try_parse_from([
            "lsfview", "--snapshot", "capture.json", "shared", "--resource", "licA", "--resource", "licB",
            "--host", "hostA",
        ])
        .unwrap();
        assert_eq!(args.query, Query::Shared);
        assert_eq!(args.resources, vec!["licA", "licB"]);
        assert_eq!(args.hosts, vec!["hostA"]);
    }

    #[test]
    fn test_snapshot_and_live_conflict() {
        assert!(Args::try_parse_from(["lsfview", "--snapshot", "x.json", "--live", "hosts"]).is_err());
    }
}
