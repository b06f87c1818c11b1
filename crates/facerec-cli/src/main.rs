use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facerec_core::{LabelStore, Point, Recognizer, Rect};
use std::path::PathBuf;

mod config;

#[derive(Parser)]
#[command(name = "facerec", about = "Recognize and label faces in images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces and print known and unknown ones as JSON
    Recognize {
        image: PathBuf,
    },
    /// Label the only unknown face in an image
    Train {
        image: PathBuf,
        #[arg(short, long)]
        label: String,
    },
    /// Label the face inside (or around) a selected region
    TrainFace {
        image: PathBuf,
        #[arg(short, long)]
        label: String,
        /// Top-left corner of the selection, as X,Y
        #[arg(long, value_parser = parse_point)]
        min: Point,
        /// Bottom-right corner of the selection, as X,Y
        #[arg(long, value_parser = parse_point)]
        max: Point,
        /// Treat the selection as the detector's exact face rectangle
        #[arg(long)]
        exact: bool,
    },
    /// List enrolled labels with their sample counts
    Labels,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::from_env();
    tracing::debug!(
        models = %config.model_dir.display(),
        store = %config.store_path.display(),
        "configuration loaded"
    );

    let recognizer = Recognizer::new(LabelStore::new(&config.store_path), config.models());
    let handle = recognizer.acquire().context("failed to start face engine")?;

    match cli.command {
        Commands::Recognize { image } => {
            let recognition = handle
                .recognize(&image)
                .with_context(|| format!("recognizing {}", image.display()))?;
            println!("{}", serde_json::to_string_pretty(&recognition)?);
        }
        Commands::Train { image, label } => {
            let trained = handle
                .train(&image, &label)
                .with_context(|| format!("training {label:?} from {}", image.display()))?;
            println!("{}", serde_json::to_string_pretty(&trained)?);
        }
        Commands::TrainFace {
            image,
            label,
            min,
            max,
            exact,
        } => {
            let selection = Rect { min, max };
            let rect = if exact {
                selection
            } else {
                handle
                    .recognize(&image)
                    .with_context(|| format!("recognizing {}", image.display()))?
                    .resolve_selection(&selection)
                    .with_context(|| format!("selection {selection}"))?
            };
            let trained = handle
                .train_face(&image, rect, &label)
                .with_context(|| format!("training {label:?} at {rect}"))?;
            println!("{}", serde_json::to_string_pretty(&trained)?);
        }
        Commands::Labels => {
            println!("{}", serde_json::to_string_pretty(&handle.label_summary()?)?);
        }
    }

    handle.release();
    Ok(())
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {s:?}"))?;
    let coord = |v: &str| {
        v.trim()
            .parse::<i32>()
            .map_err(|e| format!("bad coordinate {v:?}: {e}"))
    };
    Ok(Point::new(coord(x)?, coord(y)?))
}
