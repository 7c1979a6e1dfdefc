use anyhow::{Context, Result};
use burn::config::Config;
use burn::tensor::{Data, Shape, Tensor};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use embed_position::config::{DefaultBackend as B, DefaultDevice};
use embed_position::{EmbedPositionConfig, EmbedPositionWeights, StreamingEmbedPosition};

/// Run a random sequence through the position encoder once in full and once in
/// streamed chunks, and report how far the two disagree.
#[derive(Parser)]
#[command(name = "embed-position", version)]
struct Cli {
    /// token feature width (ignored with --config or --weights)
    #[arg(long, default_value_t = 64)]
    d_emb: usize,
    /// hidden recurrence width (ignored with --config or --weights)
    #[arg(long, default_value_t = 16)]
    d_hid: usize,
    /// tokens in the generated sequence
    #[arg(long, default_value_t = 4096)]
    n_tok: usize,
    /// tokens per streamed chunk
    #[arg(long, default_value_t = 512)]
    chunk: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// module config json (as written by `EmbedPositionConfig::save`)
    #[arg(long)]
    config: Option<PathBuf>,
    /// projection weights json
    #[arg(long)]
    weights: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    anyhow::ensure!(cli.chunk > 0, "--chunk must be positive");

    let weights = match &cli.weights {
        Some(path) => Some(
            EmbedPositionWeights::from_file(path)
                .with_context(|| format!("loading weights {}", path.display()))?,
        ),
        None => None,
    };
    let config = match (&cli.config, &weights) {
        (Some(path), _) => EmbedPositionConfig::load(path)
            .map_err(|e| anyhow::anyhow!("{e:?}"))
            .with_context(|| format!("loading config {}", path.display()))?,
        (None, Some(weights)) => EmbedPositionConfig::from_weights(weights)?,
        (None, None) => EmbedPositionConfig::new(cli.d_emb, cli.d_hid),
    };
    let device = DefaultDevice::Cpu;
    let module = match &weights {
        Some(weights) => config.init_with_weights::<B>(weights, &device)?,
        None => config.init::<B>(&device)?,
    };
    tracing::info!("EmbedPosition({})", module.extra_repr());

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let values: Vec<f32> = (0..cli.n_tok * config.d_emb)
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    let x = Tensor::<B, 2>::from_floats(
        Data::new(values, Shape::new([cli.n_tok, config.d_emb])),
        &device,
    );

    let now = Instant::now();
    let full = module.forward(x.clone())?;
    let full_secs = now.elapsed().as_secs_f32();

    let mut stream = StreamingEmbedPosition::new(module);
    let now = Instant::now();
    let mut chunks = Vec::new();
    for (i, start) in (0..cli.n_tok).step_by(cli.chunk).enumerate() {
        let end = (start + cli.chunk).min(cli.n_tok);
        let chunk = x.clone().slice([start..end, 0..config.d_emb]);
        chunks.push(stream.forward(chunk, i > 0)?);
    }
    let streamed_secs = now.elapsed().as_secs_f32();

    let max_diff = if chunks.is_empty() {
        0.0
    } else {
        let streamed = Tensor::cat(chunks, 0);
        (full - streamed).abs().max().into_scalar()
    };

    tracing::info!(
        "full: {:.1} tok/s, streamed ({} per chunk): {:.1} tok/s",
        cli.n_tok as f32 / full_secs,
        cli.chunk,
        cli.n_tok as f32 / streamed_secs
    );
    tracing::info!("max |full - streamed| = {max_diff:e}");
    Ok(())
}
