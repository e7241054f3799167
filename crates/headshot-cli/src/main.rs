use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use headshot_core::{FaceLocator, ImageHandle, Rect};
use headshot_flow::{
    CaptureFlow, CaptureStep, Category, CommitStatus, Config, HttpRemote, PartyFlow, PartyStep,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "headshot", about = "Find faces in photos and turn them into contact headshots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces and print the regions as JSON
    Detect {
        /// Image file path or http(s) URL
        image: String,
    },
    /// Write a square JPEG headshot
    Crop {
        image: String,
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
        /// Which detected face to use
        #[arg(long, default_value_t = 0)]
        face: usize,
        /// Manual region "x,y,width,height"; skips detection
        #[arg(long, value_parser = parse_region)]
        region: Option<Rect>,
    },
    /// Create one contact with a headshot from a photo
    Add {
        image: String,
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        hint: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        #[arg(short, long, default_value_t = Category::Other)]
        category: Category,
        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(long, default_value_t = 0)]
        face: usize,
        /// Region to use when no face is found, "x,y,width,height"
        #[arg(long, value_parser = parse_region)]
        region: Option<Rect>,
    },
    /// Name every face in a group photo and create a contact for each
    Party {
        image: String,
        /// One name per detected face, in order; an empty name skips that face
        #[arg(short, long = "name", required = true)]
        names: Vec<String>,
        #[arg(short, long, default_value_t = Category::Other)]
        category: Category,
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Region to use when no face is found, "x,y,width,height"
        #[arg(long, value_parser = parse_region)]
        region: Option<Rect>,
    },
    /// Show configuration and available detectors
    Status,
}

fn parse_region(s: &str) -> Result<Rect, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid region {s:?}: {e}"))?;
    match parts[..] {
        [x, y, width, height] => Ok(Rect::new(x, y, width, height)),
        _ => Err(format!("region needs 4 numbers, got {}", parts.len())),
    }
}

fn remote(config: &Config) -> Result<HttpRemote> {
    let url = config
        .api_url
        .as_deref()
        .context("HEADSHOT_API_URL is not set")?;
    Ok(HttpRemote::new(url, config.api_token.as_deref())?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let locator = Arc::new(FaceLocator::probe(
        None,
        config.model_loader(),
        config.confidence_floor,
    ));

    match cli.command {
        Commands::Detect { image } => {
            let result = locator.detect(&ImageHandle::parse(&image)).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Crop {
            image,
            out,
            face,
            region,
        } => {
            let mut flow = CaptureFlow::new(locator, config.cropper());
            let step = flow.select_image(ImageHandle::parse(&image)).await?;
            match (step, region) {
                (CaptureStep::FaceSelection, None) => flow.choose_face(face)?,
                (CaptureStep::FaceSelection, Some(region)) => {
                    flow.crop_manually()?;
                    flow.confirm_crop(region)?;
                }
                (CaptureStep::Crop, Some(region)) => flow.confirm_crop(region)?,
                _ => bail!("no face found in {image}; pass --region x,y,width,height"),
            }
            let photo = flow
                .draft()
                .photo
                .as_ref()
                .context("no headshot was produced")?;
            let bytes = photo.read_bytes().await?;
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {} ({} bytes)", out.display(), bytes.len());
        }
        Commands::Add {
            image,
            name,
            hint,
            summary,
            category,
            tags,
            face,
            region,
        } => {
            let remote = remote(&config)?;
            let mut flow = CaptureFlow::new(locator, config.cropper());
            let step = flow.select_image(ImageHandle::parse(&image)).await?;
            match (step, region) {
                (CaptureStep::FaceSelection, _) => flow.choose_face(face)?,
                (CaptureStep::Crop, Some(region)) => flow.confirm_crop(region)?,
                (CaptureStep::Crop, None) => {
                    println!("No face found; creating {name} without a photo");
                    flow.cancel()?;
                }
                _ => {}
            }
            let draft = flow.draft_mut();
            draft.name = name;
            draft.hint = hint;
            draft.summary = summary;
            draft.category = category;
            draft.tags = headshot_flow::normalize_tags(tags);
            let ack = flow.submit(&remote, &remote).await?;
            println!("Created contact {}", ack.id);
        }
        Commands::Party {
            image,
            names,
            category,
            tags,
            region,
        } => {
            let remote = remote(&config)?;
            let mut flow = PartyFlow::new(locator, config.cropper());
            if flow.select_image(ImageHandle::parse(&image)).await? == PartyStep::Crop {
                let region = region.context("no faces found; pass --region x,y,width,height")?;
                flow.confirm_crop(region)?;
            }

            let ids: Vec<String> = flow.candidates().iter().map(|c| c.id.clone()).collect();
            if names.len() > ids.len() {
                eprintln!(
                    "Warning: {} names given but only {} faces found; extra names ignored",
                    names.len(),
                    ids.len()
                );
            }
            for (id, name) in ids.iter().zip(&names) {
                flow.set_name(id, name)?;
            }
            flow.continue_to_category()?;
            flow.set_category(category);
            flow.set_tags(tags);

            let report = flow.commit(&remote, &remote).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            match report.status {
                CommitStatus::Completed(_) => {}
                CommitStatus::Partial { failed } => bail!("could not save: {}", failed.join(", ")),
                CommitStatus::Failed => bail!("could not save any contacts"),
            }
        }
        Commands::Status => {
            let model_path = config.scrfd_model_path();
            println!("headshot {}", env!("CARGO_PKG_VERSION"));
            println!("  detectors:         {}", locator.backend_kinds().join(", "));
            println!(
                "  model:             {} ({})",
                model_path.display(),
                if model_path.exists() { "present" } else { "missing" }
            );
            println!(
                "  model url:         {}",
                config.model_url.as_deref().unwrap_or("(fetch disabled)")
            );
            println!("  confidence floor:  {}", config.confidence_floor);
            println!("  crop padding:      {} px", config.crop_padding);
            println!("  jpeg quality:      {}", config.jpeg_quality);
            println!(
                "  api:               {}",
                config.api_url.as_deref().unwrap_or("(not configured)")
            );
        }
    }

    Ok(())
}
