//! Offline renderer: applies the configured visual-field effect to image files.
//!
//! Delegates all logic to the library crate; no local modules here.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};
use visual_field_sim::config::{Configuration, EffectKind};
use visual_field_sim::frame::{Frame, PixelFormat};
use visual_field_sim::mask::{DirectoryMaskLoader, Eye};
use visual_field_sim::session::Session;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EyeArg {
    Left,
    Right,
}

impl From<EyeArg> for Eye {
    fn from(eye: EyeArg) -> Self {
        match eye {
            EyeArg::Left => Eye::Left,
            EyeArg::Right => Eye::Right,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EffectArg {
    Blur,
    Opaque,
}

impl From<EffectArg> for EffectKind {
    fn from(effect: EffectArg) -> Self {
        match effect {
            EffectArg::Blur => EffectKind::Blur,
            EffectArg::Opaque => EffectKind::Opaque,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "visual-field-sim",
    about = "Simulate visual-field loss on rendered eye images"
)]
struct Cli {
    /// Path to YAML config file; defaults apply when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source image
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Where to write the processed image
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Which eye the image was rendered for
    #[arg(long, value_enum, default_value = "left")]
    eye: EyeArg,

    /// Override the headset model name
    #[arg(long, value_name = "NAME")]
    device: Option<String>,

    /// Override the effect type
    #[arg(long, value_enum)]
    effect: Option<EffectArg>,

    /// Override the condition id
    #[arg(long, value_name = "ID")]
    condition: Option<i32>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("visual_field_sim={level}").parse()?)
        .add_directive("wgpu=warn".parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Configuration> {
    let mut cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(device) = &cli.device {
        cfg.display.device = Some(device.clone());
        cfg.display.custom = None;
    }
    if let Some(effect) = cli.effect {
        cfg.effect.kind = effect.into();
    }
    if let Some(condition) = cli.condition {
        cfg.effect.condition = condition;
    }
    cfg.validated().context("validating configuration")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = load_config(&cli)?;
    let loader = DirectoryMaskLoader::new(&cfg.mask_directory);
    let mut session = Session::start(&cfg, Box::new(loader))?;

    let image = image::open(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?
        .to_rgba8();
    // Decoded PNG and JPEG files carry sRGB-encoded color.
    let source = Frame::from_image(image, PixelFormat::Rgba8UnormSrgb);
    let mut destination = Frame::from_descriptor(source.descriptor());

    let eye = Eye::from(cli.eye);
    session
        .render(eye, &source, &mut destination)
        .with_context(|| format!("rendering {} eye", eye))?;

    destination
        .into_image()
        .save(&cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    info!(
        input = %cli.input.display(),
        output = %cli.output.display(),
        eye = %eye,
        "frame written"
    );
    Ok(())
}
