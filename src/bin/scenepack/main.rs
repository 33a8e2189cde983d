//! scenepack CLI - Tool for inspecting and validating scenepack files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use scenepack::fixture::{BufferBuilder, ObjectSpec, Value};
use scenepack::graph::{ComponentKind, NodeKey, SceneGraph};
use scenepack::object::Document;
use scenepack::util::Config;
use scenepack::xref::{FileSource, LoaderRegistry, MeshData, RawMeshCodec, ResourceManager, XRefStyle};

#[derive(Parser)]
#[command(name = "scenepack")]
#[command(about = "Inspect and validate scenepack scene containers")]
#[command(version, long_version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("SCENEPACK_BUILD_DATE"), " ", env!("SCENEPACK_BUILD_TIME"), ")"))]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show header, sections and object counts
    #[command(alias = "i")]
    Info { file: PathBuf },

    /// Show the node hierarchy
    #[command(alias = "t")]
    Tree {
        file: PathBuf,
        /// Stop below this depth
        #[arg(short, long)]
        depth: Option<usize>,
        /// Resolve instances and meshes through the file's directory
        #[arg(short, long)]
        resolve: bool,
    },

    /// Decode every reachable object of each file
    #[command(alias = "c")]
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Write a small sample scene
    Demo { out: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => match Config::load_json(path) {
            Ok(cfg) => cfg,
            Err(e) => fail(&format!("{}: {e}", path.display())),
        },
        None => Config::default(),
    };

    let result = match cli.command {
        Command::Info { file } => cmd_info(&file, &config),
        Command::Tree { file, depth, resolve } => cmd_tree(&file, &config, depth, resolve),
        Command::Check { files } => cmd_check(&files, &config),
        Command::Demo { out } => cmd_demo(&out),
    };
    if let Err(e) = result {
        fail(&e.to_string());
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn fail(msg: &str) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

fn cmd_info(file: &Path, config: &Config) -> scenepack::Result<()> {
    let doc = Document::open(file, config.decode.clone())?;
    let header = doc.header();
    println!("File:        {}", file.display());
    println!("Version:     {}", header.version);
    println!("Size:        {} bytes{}", doc.buffer().as_slice().len(), if doc.buffer().is_mapped() { " (mapped)" } else { "" });
    println!("Strings:     {}", doc.strings().len());
    println!("Xref records: {}", doc.records().len());
    match doc.thumbnail()? {
        Some(bytes) => println!("Thumbnail:   {} bytes", bytes.len()),
        None => println!("Thumbnail:   none"),
    }
    println!();
    println!("Shortcuts:");
    for (name, offset) in doc.shortcuts().iter() {
        println!("  {name:<16} @{offset}");
    }
    for record in doc.records() {
        println!(
            "  record {:<9} {} ({}, {} bytes{})",
            record.index,
            record.url,
            record.style.name(),
            record.payload.len(),
            if record.encoding.is_empty() { String::new() } else { format!(", {}", record.encoding) }
        );
    }
    let reachable = doc.decode_all()?;
    println!();
    println!("Objects:     {reachable} reachable, {} decoded", doc.cached_objects());
    Ok(())
}

fn cmd_tree(file: &Path, config: &Config, depth: Option<usize>, resolve: bool) -> scenepack::Result<()> {
    let doc = Arc::new(Document::open(file, config.decode.clone())?);
    let mut graph = SceneGraph::new();
    let root = graph.load_document(doc)?;

    if resolve {
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        let manager = ResourceManager::new(LoaderRegistry::with_defaults(config.decode.clone()), config.resolver.clone())
            .with_source(Arc::new(FileSource::new(dir)));
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        runtime.block_on(resolve_all(&mut graph, root, &manager))?;
    }

    let mut stack: Vec<(NodeKey, String, usize)> = vec![(root, graph.node(root)?.id().to_string(), 0)];
    while let Some((key, name, level)) = stack.pop() {
        let kinds: Vec<&str> = graph.node(key)?.component_kinds().map(ComponentKind::name).collect();
        let parents = graph.node(key)?.parents().len();
        let mut line = format!("{}{name}", "  ".repeat(level));
        if !kinds.is_empty() {
            line.push_str(&format!(" [{}]", kinds.join(", ")));
        }
        if parents > 1 {
            line.push_str(&format!(" ({parents} parents)"));
        }
        if graph.has_geometry(key)? {
            let b = graph.bounds(key)?;
            if !b.is_empty() {
                line.push_str(&format!(" bounds=({:.2}, {:.2}, {:.2})..({:.2}, {:.2}, {:.2})", b.min.x, b.min.y, b.min.z, b.max.x, b.max.y, b.max.z));
            }
        }
        println!("{line}");

        if depth.is_some_and(|d| level >= d) {
            if graph.node(key)?.expected_children() > 0 {
                println!("{}...", "  ".repeat(level + 1));
            }
            continue;
        }
        let children = graph.children(key)?;
        for (child_name, child) in children.into_iter().rev() {
            stack.push((child, child_name, level + 1));
        }
    }
    Ok(())
}

async fn resolve_all(graph: &mut SceneGraph, root: NodeKey, manager: &ResourceManager) -> scenepack::Result<()> {
    let mut stack = vec![root];
    let mut seen = std::collections::HashSet::new();
    while let Some(key) = stack.pop() {
        if !seen.insert(key) {
            continue;
        }
        let node = graph.node(key)?;
        let (instance, mesh) = (
            node.component(ComponentKind::Instance).is_some(),
            node.component(ComponentKind::Mesh).is_some(),
        );
        if instance {
            graph.load_instance(key, manager).await?;
        }
        if mesh {
            graph.load_mesh(key, manager).await?;
        }
        stack.extend(graph.children(key)?.into_iter().map(|(_, k)| k));
    }
    Ok(())
}

fn cmd_check(files: &[PathBuf], config: &Config) -> scenepack::Result<()> {
    let options = config.decode.clone().validate_on_open(true);
    let results: Vec<_> = files
        .par_iter()
        .map(|file| (file, Document::open(file, options.clone()).map(|doc| doc.cached_objects())))
        .collect();

    let mut failed = 0;
    for (file, result) in &results {
        match result {
            Ok(objects) => println!("OK    {} ({objects} objects)", file.display()),
            Err(e) => {
                failed += 1;
                println!("FAIL  {}: {e}", file.display());
            }
        }
    }
    if failed > 0 {
        fail(&format!("{failed} of {} files failed", files.len()));
    }
    Ok(())
}

fn cmd_demo(out: &Path) -> scenepack::Result<()> {
    let cube = MeshData {
        positions: vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ],
        indices: vec![
            0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 2, 3, 7, 2, 7, 6, 1, 2, 6, 1, 6, 5, 0, 4, 7, 0, 7, 3,
        ],
    };

    let mut b = BufferBuilder::new();
    b.xref_record("meshes/cube.mesh", XRefStyle::Internal, 0, "", "", &RawMeshCodec::encode(&cube));

    let mesh = b.object(
        &ObjectSpec::new("Mesh")
            .field("source", Value::xref("meshes/cube.mesh"))
            .field("levels", Value::Packed(0b1_0001)),
    );
    let material = b.object(
        &ObjectSpec::new("Material")
            .field("name", Value::str("painted"))
            .field("color", Value::Color([0.8, 0.2, 0.1, 1.0])),
    );
    let shift = b.object(
        &ObjectSpec::new("Transform").field("transform", Value::Transform { position: [3.0, 0.0, 0.0], mapping: None }),
    );
    let tags = b.object(&ObjectSpec::new("Tags").field("tags", Value::Array(vec![Value::str("prop"), Value::str("demo")])));

    let crate_a = b.object(&ObjectSpec::node("crate", &[], &[mesh, material]));
    let crate_b = b.object(&ObjectSpec::node("crate", &[], &[mesh, material, shift]));
    let shelf = b.object(&ObjectSpec::node("shelf", &[crate_a, crate_b], &[tags]));
    let yard = b.object(&ObjectSpec::node("yard", &[crate_a], &[]));
    let root = b.object(&ObjectSpec::node("root", &[shelf, yard], &[]));
    b.set_root(root);
    b.shortcut("shelf", shelf);

    b.write_to(out)?;
    println!("Wrote {}", out.display());
    Ok(())
}
