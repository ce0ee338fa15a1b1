use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vegann_cli::{
    backend::{backend_name, create_device},
    overlay::{OverlayArgs, run_overlay},
    training::run_training,
};

#[derive(Parser)]
#[command(name = "vegann")]
#[command(about = "Binary vegetation/ground segmentation: training and visualization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a segmentation model
    Train {
        /// Training configuration file (JSON)
        #[arg(short, long)]
        config: String,
    },

    /// Blend class colors over an image according to a label mask
    Overlay {
        /// Input image path
        #[arg(short, long)]
        image: String,

        /// Label mask path (0 = ground, 1 = vegetation)
        #[arg(short, long)]
        mask: String,

        /// Output PNG path
        #[arg(short, long)]
        output: String,

        /// Blend strength for ground pixels
        #[arg(long, default_value_t = 0.5)]
        alpha_ground: f32,

        /// Blend strength for vegetation pixels
        #[arg(long, default_value_t = 0.5)]
        alpha_vegetation: f32,
    },

    /// Show backend information
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { config } => run_training(config),

        Commands::Overlay {
            image,
            mask,
            output,
            alpha_ground,
            alpha_vegetation,
        } => run_overlay(
            image,
            mask,
            output,
            &OverlayArgs {
                alpha_ground,
                alpha_vegetation,
            },
        ),

        Commands::Info => {
            println!("VegAnn Information:");
            println!("  Backend: {}", backend_name());
            println!("  Device: {:?}", create_device());
            Ok(())
        }
    }
}
