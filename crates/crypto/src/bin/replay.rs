//! Replays recorded AccQueue events and prints the resulting roots.

use std::env;
use std::process::ExitCode;

use anyhow::Context;
use maci_crypto::replay::ReplayFile;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args.contains(&"--help".to_string()) {
        print_usage();
        return Ok(ExitCode::SUCCESS);
    }

    let replay = ReplayFile::load(&args[1])?;
    let report = replay
        .run()
        .with_context(|| format!("Replay of {} failed", args[1]))?;

    println!("AccQueue replay");
    println!("===============");
    println!("Leaves:          {}", report.num_leaves);
    println!("Subtrees:        {}", report.num_subtrees);
    println!("SRT depth:       {}", report.srt_depth);
    println!("Merge calls:     {}", report.merge_calls);
    println!("SRT root:        {}", report.small_srt_root);
    println!("Main root:       {}", report.main_root);
    println!("Direct root:     {}", report.direct_root);

    if !report.roots_match() {
        tracing::error!("merge and merge_direct disagree");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_usage() {
    println!("aq-replay - Recompute AccQueue roots from recorded events");
    println!();
    println!("USAGE:");
    println!("    aq-replay <REPLAY_FILE>");
    println!();
    println!("OPTIONS:");
    println!("    --help        Print this help message");
    println!();
    println!("REPLAY FILE (JSON):");
    println!("    queue        {{ \"sub_depth\", \"hash_length\", \"zero_value\" }}");
    println!("    hasher       \"poseidon\" (default) or \"sha256\"");
    println!("    leaves       Field elements as decimal strings");
    println!("    batches      Subroots queued per merge_sub_roots call");
    println!("    main_depth   Depth of the main root");
    println!();
    println!("Set RUST_LOG=debug to trace subtree completion and merges.");
}
