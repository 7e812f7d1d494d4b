use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use vidio::image_io::{self, OutputFormat};
use vidio::{FrameWriter, ImageSequenceWriter, VideoOptions, VideoWriter};

#[derive(Debug, clap::ValueEnum, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum EncodeFormat {
    #[default]
    Video,
    PngSequence,
    JpgSequence,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Re-encode an image, format picked from the output suffix
    Convert { input: PathBuf, output: PathBuf },
    /// Stream images as raw frames into a video or an image sequence
    Encode {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value_t)]
        format: EncodeFormat,

        /// JSON file with video writer options
        #[arg(long)]
        options: Option<PathBuf>,

        #[arg(long)]
        fps: Option<f64>,

        #[arg(long)]
        codec: Option<String>,

        #[arg(long)]
        bitrate: Option<u32>,

        /// Forward ffmpeg's stderr
        #[arg(short, long)]
        verbose: bool,

        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

fn convert_image(input: &Path, output: &Path) -> Result<()> {
    let image = image_io::read(input)?;
    log::info!(
        "converting {} ({}x{}) to {}",
        input.display(),
        image.width,
        image.height,
        output.display()
    );
    image_io::write_buffer(output, &image)
}

fn load_options(path: Option<&Path>) -> Result<VideoOptions> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid video options in {}", path.display()))
        }
        None => Ok(VideoOptions::default()),
    }
}

#[allow(clippy::too_many_arguments)]
fn encode_images(
    images: &[PathBuf],
    output: &Path,
    format: EncodeFormat,
    options: Option<&Path>,
    fps: Option<f64>,
    codec: Option<String>,
    bitrate: Option<u32>,
    verbose: bool,
) -> Result<()> {
    let (first, rest) = images.split_first().context("no input images")?;
    let first_image = image_io::read(first)?;
    let (width, height) = (first_image.width, first_image.height);

    let mut writer: Box<dyn FrameWriter> = match format {
        EncodeFormat::Video => {
            log::info!("Encoding with ffmpeg");
            let mut opts = load_options(options)?;
            opts.width = width;
            opts.height = height;
            // frames come from image_io, always rgb24
            opts.pix_fmt = "rgb24".to_string();
            if let Some(fps) = fps {
                opts.fps = fps;
            }
            if let Some(codec) = codec {
                opts.codec = codec;
            }
            if let Some(bitrate) = bitrate {
                opts.bitrate = bitrate;
            }
            opts.show_encoder_output |= verbose;
            Box::new(VideoWriter::new(output, opts)?)
        }
        EncodeFormat::PngSequence => {
            log::info!("Writing PNG sequence");
            Box::new(ImageSequenceWriter::new(output, width, height, OutputFormat::Png))
        }
        EncodeFormat::JpgSequence => {
            log::info!("Writing JPG sequence");
            Box::new(ImageSequenceWriter::new(output, width, height, OutputFormat::Jpeg))
        }
    };

    writer.start()?;
    writer.write_frame(&first_image.data)?;
    for (i, path) in rest.iter().enumerate() {
        let image = image_io::read(path)?;
        if image.width != width || image.height != height {
            bail!(
                "{} is {}x{}, expected {}x{}",
                path.display(),
                image.width,
                image.height,
                width,
                height
            );
        }
        writer.write_frame(&image.data)?;
        log::info!("Encoded {} frame(s)", i + 2);
    }
    writer.close()?;

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();
    match args.command {
        Cmd::Convert { input, output } => convert_image(&input, &output),
        Cmd::Encode {
            output,
            format,
            options,
            fps,
            codec,
            bitrate,
            verbose,
            images,
        } => encode_images(
            &images,
            &output,
            format,
            options.as_deref(),
            fps,
            codec,
            bitrate,
            verbose,
        ),
    }
}
