//! Example: Level decoding of a synthetic clock
//!
//! Generates a square wave with occasional glitches, decodes it with a
//! simple level decoder and prints the resulting rows.
//!
//! Usage:
//!   cargo run --release --example edge_decode -- \
//!       --samples 1000000 --half-period 50 --glitch-every 97 \
//!       -n 20

use clap::Parser;
use decode_stack::{
    AnnotationClass, AnnotationRowSpec, ChannelSpec, DecodeEvent, DecodeStack, Decoder,
    DecoderDescriptor, DecoderInstance, DecoderOptions, DecoderOutput, LogicChunk, LogicData,
    LogicSnapshot, SampleSnapshot, StaticSignalSource,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of samples to generate
    #[arg(long, default_value = "1000000")]
    samples: u64,

    /// Samples per clock half period
    #[arg(long, default_value = "50")]
    half_period: u64,

    /// Insert a one-sample glitch every N half periods (0 = never)
    #[arg(long, default_value = "97")]
    glitch_every: u64,

    /// Sample rate in Hz
    #[arg(long, default_value = "10000000")]
    samplerate: u64,

    /// Maximum samples per decode step
    #[arg(long, default_value = "4096")]
    chunk_size: u64,

    /// Snapshot block size in samples
    #[arg(long, default_value = "65536")]
    block_size: u64,

    /// Levels narrower than this are reported as glitches
    #[arg(long, default_value = "3")]
    min_width: u64,

    /// Number of annotations to print per row
    #[arg(short, long, default_value = "10")]
    n: u64,
}

/// Reports each stretch of constant level, flagging short ones as glitches
struct Levels;

struct LevelsInstance {
    min_width: u64,
    samplerate: u64,
    level: Option<bool>,
    edge: u64,
}

impl DecoderDescriptor for Levels {
    fn id(&self) -> &str {
        "levels"
    }

    fn name(&self) -> &str {
        "Levels"
    }

    fn channels(&self) -> Vec<ChannelSpec> {
        vec![ChannelSpec::new("clk", "CLK")]
    }

    fn annotation_classes(&self) -> Vec<AnnotationClass> {
        vec![
            AnnotationClass::new("low", "Low level"),
            AnnotationClass::new("high", "High level"),
            AnnotationClass::new("glitch", "Glitch"),
        ]
    }

    fn annotation_rows(&self) -> Vec<AnnotationRowSpec> {
        vec![
            AnnotationRowSpec::new("levels", "Levels", vec![0, 1]),
            AnnotationRowSpec::new("warnings", "Warnings", vec![2]),
        ]
    }

    fn create_instance(&self, options: &DecoderOptions) -> Result<Box<dyn DecoderInstance>, String> {
        let min_width = options
            .get("min_width")
            .map(|v| v.parse::<u64>().map_err(|_| format!("Invalid min_width: {}", v)))
            .transpose()?
            .unwrap_or(1);
        Ok(Box::new(LevelsInstance {
            min_width,
            samplerate: 0,
            level: None,
            edge: 0,
        }))
    }
}

impl DecoderInstance for LevelsInstance {
    fn start(&mut self, samplerate: u64) -> Result<(), String> {
        self.samplerate = samplerate;
        Ok(())
    }

    fn decode(&mut self, chunk: &LogicChunk<'_>, out: &mut DecoderOutput) -> Result<(), String> {
        for pos in chunk.start()..chunk.end() {
            let level = chunk.sample(0, pos).ok_or("Sample outside chunk")?;
            match self.level {
                Some(prev) if prev != level => {
                    let width = pos - self.edge;
                    let nanos = width * 1_000_000_000 / self.samplerate.max(1);
                    let name = if prev { "High" } else { "Low" };
                    out.annotate(
                        self.edge,
                        pos,
                        prev as u32,
                        vec![format!("{} {} ns", name, nanos), name[..1].to_string()],
                    );
                    if width < self.min_width {
                        out.annotate(self.edge, pos, 2, vec![format!("Glitch ({} samples)", width)]);
                    }
                    self.edge = pos;
                }
                Some(_) => {}
                None => self.edge = pos,
            }
            self.level = Some(level);
        }
        Ok(())
    }
}

fn clock(args: &Args) -> impl Iterator<Item = bool> {
    let half_period = args.half_period.max(1);
    let glitch_every = args.glitch_every;
    (0..args.samples).map(move |i| {
        let half = i / half_period;
        let level = half % 2 == 1;
        let glitch = glitch_every != 0 && half % glitch_every == 0 && i % half_period == half_period / 2;
        level ^ glitch
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let snapshot = LogicSnapshot::with_block_size(args.samples, args.block_size).with_channel(0, clock(&args));
    let snapshot: Arc<dyn SampleSnapshot> = Arc::new(snapshot);
    let source = StaticSignalSource::new(LogicData::new(snapshot, args.samplerate), 1);

    let mut stack = DecodeStack::new(Arc::new(source)).with_max_chunk_size(args.chunk_size);
    stack.push(
        Decoder::new(Arc::new(Levels))
            .with_channel("clk", 0)
            .with_option("min_width", args.min_width.to_string()),
    );

    let events = stack.subscribe();
    stack.begin_decode();
    if stack.sample_count() == 0 {
        warn!("Nothing to decode");
        return Ok(());
    }

    for event in events.iter() {
        match event {
            DecodeEvent::Progress { samples_decoded } => {
                info!(
                    "Progress: {:.1}%",
                    samples_decoded as f64 * 100.0 / args.samples as f64
                );
            }
            DecodeEvent::Done => break,
        }
    }
    stack.wait_decode();

    let error = stack.error_message();
    if !error.is_empty() {
        warn!("Decode failed: {}", error);
        return Err(error.into());
    }

    info!(
        "Decoded {} of {} samples at {} Hz",
        stack.samples_decoded(),
        stack.sample_count(),
        stack.sample_rate()
    );

    for row in stack.rows() {
        let annotations = stack.get_annotation_subset(&row, 0, stack.sample_count());
        println!(
            "{} ({} annotations, span {}..{})",
            row,
            annotations.len(),
            stack.get_min_annotation(&row),
            stack.get_max_annotation(&row)
        );
        for ann in annotations.iter().take(args.n as usize) {
            println!("  {}", ann);
        }
    }

    Ok(())
}
