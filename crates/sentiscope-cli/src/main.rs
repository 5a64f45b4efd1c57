mod cli;
mod display;
mod evaluate;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use sentiscope_ai::{Analyzer, Loader, OnnxInitializer};
use sentiscope_core::{RawOutput, RawScoreSet, ScoreEntry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Level;

use crate::cli::{Args, Command, EngineArgs, PolicyArgs};
use crate::display::DecisionRecord;
use crate::evaluate::{Dataset, DatasetFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    tracing::info!("sentiscope v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Analyze {
            texts,
            json,
            engine,
            policy,
        } => analyze(texts, json, &engine, &policy).await,
        Command::Interactive { engine, policy } => interactive(&engine, &policy).await,
        Command::Decide {
            pos,
            neg,
            raw,
            json,
            policy,
        } => decide(pos, neg, raw.as_deref(), json, &policy),
        Command::Evaluate {
            file,
            format,
            limit,
            engine,
            policy,
        } => run_evaluation(&file, format, limit, &engine, &policy).await,
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn build_analyzer(
    engine: &EngineArgs,
    policy: &PolicyArgs,
) -> anyhow::Result<Analyzer<OnnxInitializer>> {
    let loader = Loader::new(OnnxInitializer, engine.engine_config());
    Ok(Analyzer::new(loader, policy.policy()?, engine.input_policy()))
}

async fn read_stdin_lines() -> anyhow::Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if !line.trim().is_empty() {
            out.push(line);
        }
    }
    Ok(out)
}

async fn analyze(
    texts: Vec<String>,
    json: bool,
    engine: &EngineArgs,
    policy: &PolicyArgs,
) -> anyhow::Result<()> {
    let analyzer = build_analyzer(engine, policy)?;
    let inputs = if texts.is_empty() {
        read_stdin_lines().await?
    } else {
        texts
    };

    let many = inputs.len() > 1;
    let mut failed = 0usize;
    for text in &inputs {
        match analyzer.analyze_detailed(text).await {
            Ok(analysis) if json => {
                println!("{}", DecisionRecord::from_analysis(text, &analysis).to_json()?);
            }
            Ok(analysis) => {
                println!("{}", display::result_line(text, &analysis.decision, many));
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}", e.user_message());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} inputs failed", inputs.len());
    }
    Ok(())
}

async fn interactive(engine: &EngineArgs, policy: &PolicyArgs) -> anyhow::Result<()> {
    let analyzer = build_analyzer(engine, policy)?;

    eprintln!("Loading model…");
    let mut progress = analyzer.loader().subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = progress.next().await {
            eprintln!("{event}");
        }
    });
    let preload = analyzer.loader().preload();

    eprintln!("Enter text to analyze, one per line (Ctrl-D to quit).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        match analyzer.analyze(&line).await {
            Ok(decision) => println!("{decision}"),
            Err(e) => eprintln!("{}", e.user_message()),
        }
    }

    // Input ended, possibly before the model finished loading.
    preload.abort();
    printer.abort();
    Ok(())
}

fn decide(
    pos: Option<f64>,
    neg: Option<f64>,
    raw: Option<&str>,
    json: bool,
    policy: &PolicyArgs,
) -> anyhow::Result<()> {
    let policy = policy.policy()?;
    let scores = match (raw, pos, neg) {
        (Some(raw), _, _) => RawOutput::from_json(raw)
            .context("parsing --raw scores")?
            .into_score_set(),
        (None, Some(pos), Some(neg)) => RawScoreSet::new(vec![
            ScoreEntry::new("POSITIVE", pos),
            ScoreEntry::new("NEGATIVE", neg),
        ]),
        _ => anyhow::bail!("provide --pos and --neg, or --raw"),
    };

    let decision = policy.decide(&scores);
    if json {
        println!(
            "{}",
            DecisionRecord::new(None, decision, &scores, false).to_json()?
        );
    } else {
        println!("{decision}");
    }
    Ok(())
}

async fn run_evaluation(
    file: &Path,
    format: Option<DatasetFormat>,
    limit: usize,
    engine: &EngineArgs,
    policy: &PolicyArgs,
) -> anyhow::Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let format = format.unwrap_or_else(|| DatasetFormat::from_path(file));
    let dataset = Dataset::parse(format, &contents);
    println!("{dataset}");
    anyhow::ensure!(
        !dataset.samples.is_empty(),
        "no positive/negative samples in {}",
        file.display()
    );

    let analyzer = build_analyzer(engine, policy)?;
    eprintln!("Loading model…");
    analyzer
        .loader()
        .ensure_ready()
        .await
        .context("loading model")?;

    println!("Testing model with {} sample reviews:", limit.min(dataset.samples.len()));
    let summary = evaluate::run(&analyzer, &dataset, limit).await;
    println!("{summary}");
    Ok(())
}
