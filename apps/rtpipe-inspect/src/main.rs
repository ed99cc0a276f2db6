//! Ray tracing program inspector.
//!
//! Loads a program manifest, validates it against a recursion limit, links it
//! the way the Vulkan backend would and prints the resulting stages and group
//! tables. No GPU is needed.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p rtpipe-inspect -- apps/rtpipe-inspect/manifests/path_tracer.toml
//! cargo run -p rtpipe-inspect -- program.toml --max-depth 4
//! ```

mod manifest;

use std::path::PathBuf;

use anyhow::bail;
use rtpipe_core::constants::{
    API_MAX_TRACE_RECURSION_DEPTH, DEFAULT_MAX_ATTRIBUTES_SIZE, DEFAULT_MAX_PAYLOAD_SIZE,
};
use rtpipe_program::{validate, BackendLimits, GroupTables, ProgramDescriptor};
use rtpipe_vulkan::{GroupKind, LinkedGroup, ShaderGroupLayout};
use tracing_subscriber::EnvFilter;

use manifest::Manifest;

#[derive(Debug)]
struct Args {
    manifest: PathBuf,
    max_depth: u32,
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = parse_args(&std::env::args().collect::<Vec<_>>())?;

    let manifest = Manifest::load(&args.manifest)?;
    let desc = manifest.to_descriptor()?;

    let limits = BackendLimits {
        max_trace_recursion_depth: args.max_depth,
        ..BackendLimits::default()
    };
    validate(
        &desc,
        &limits,
        DEFAULT_MAX_PAYLOAD_SIZE,
        DEFAULT_MAX_ATTRIBUTES_SIZE,
    )?;

    let layout = ShaderGroupLayout::link(&desc)?;
    let tables = GroupTables::from_assignments(&desc, &layout.group_indices())?;
    tracing::info!(
        stages = layout.stages().len(),
        groups = layout.groups().len(),
        "Linked program"
    );

    print_report(&desc, &layout, &tables);
    Ok(())
}

fn init_logging() {
    #[cfg(feature = "profiling-tracy")]
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,rtpipe_program=trace,rtpipe_vulkan=trace,rtpipe_inspect=trace")
        });
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }
    #[cfg(not(feature = "profiling-tracy"))]
    {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }
}

/// Parse the command line. `args[0]` is the program name.
fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut manifest = None;
    let mut max_depth = API_MAX_TRACE_RECURSION_DEPTH;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--max-depth" | "-d" => {
                let Some(value) = args.get(i + 1) else {
                    bail!("--max-depth needs a value");
                };
                max_depth = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid --max-depth value '{value}'"))?;
                i += 1;
            }
            "--help" | "-h" => {
                println!("rtpipe-inspect");
                println!();
                println!("Usage: rtpipe-inspect <MANIFEST> [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --max-depth <N>  Backend recursion limit (default: 31)");
                println!("  -h, --help           Show this help message");
                std::process::exit(0);
            }
            other if manifest.is_none() && !other.starts_with('-') => {
                manifest = Some(PathBuf::from(other));
            }
            other => bail!("unexpected argument '{other}'"),
        }
        i += 1;
    }

    let Some(manifest) = manifest else {
        bail!("no manifest given (see --help)");
    };
    Ok(Args {
        manifest,
        max_depth,
    })
}

fn print_report(desc: &ProgramDescriptor, layout: &ShaderGroupLayout, tables: &GroupTables) {
    println!("Libraries:");
    for (i, library) in desc.libraries().iter().enumerate() {
        println!("  [{i}] {}", library.display());
    }

    if !desc.defines().is_empty() {
        println!("Defines:");
        for (name, value) in desc.defines().iter() {
            println!("  {name}={value}");
        }
    }
    println!("Compiler flags: {:?}", desc.compiler_flags());
    println!("Max trace recursion depth: {}", desc.max_trace_recursion_depth());

    println!();
    println!("Stages ({}):", layout.stages().len());
    for (i, stage) in layout.stages().iter().enumerate() {
        println!(
            "  {i:>3}  {:<12} [{}] {}",
            stage.kind.name(),
            stage.library,
            stage.entry_point
        );
    }

    for table in tables.iter() {
        println!();
        println!("{} groups ({}):", table.role(), table.count());
        for (ordinal, info) in table.iter().enumerate() {
            match info.group_index() {
                Some(group_index) => {
                    let group = &layout.groups()[group_index as usize];
                    println!(
                        "  {ordinal:>3} -> group {group_index:>3}  {}",
                        describe_group(group, layout)
                    );
                }
                None => println!("  {ordinal:>3} -> (unassigned)"),
            }
        }
    }
}

fn describe_group(group: &LinkedGroup, layout: &ShaderGroupLayout) -> String {
    let name = |stage: Option<u32>| {
        stage.map_or("-", |s| layout.stages()[s as usize].entry_point.as_str())
    };
    match group.kind {
        GroupKind::General => name(group.general).to_string(),
        GroupKind::TrianglesHit | GroupKind::ProceduralHit => format!(
            "{} ch={} ah={} is={}",
            if group.kind == GroupKind::ProceduralHit {
                "procedural"
            } else {
                "triangles"
            },
            name(group.closest_hit),
            name(group.any_hit),
            name(group.intersection)
        ),
    }
}
