mod panic_handler;

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use image::ImageFormat;
use log::{LevelFilter, info};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode, WriteLogger};

use lazyraster::{RasterConfig, Rasterizer, RenderSize, api};

#[derive(Parser, Debug)]
#[command(name = "lazyraster", version, about = "Render PDF pages to PNG or SVG")]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct PageArgs {
    /// PDF document
    file: PathBuf,

    /// Page number, starting at 1
    #[arg(short, long)]
    page: u16,

    /// Output width in pixels (takes precedence over --scale)
    #[arg(short, long, default_value_t = 0)]
    width: u16,

    /// Scale factor relative to the page size
    #[arg(short, long, default_value_t = 0.0)]
    scale: f32,
}

impl PageArgs {
    fn size(&self) -> RenderSize {
        RenderSize::new(self.width, self.scale)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a page to PNG
    Render {
        #[command(flatten)]
        page: PageArgs,

        /// Output PNG file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Render a page to SVG
    Svg {
        #[command(flatten)]
        page: PageArgs,

        /// Output SVG file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the number of pages
    Count {
        /// PDF document
        file: PathBuf,
    },

    /// Print the pixel size a page would render at
    Size {
        #[command(flatten)]
        page: PageArgs,
    },
}

impl Command {
    fn file(&self) -> &PathBuf {
        match self {
            Self::Render { page, .. } | Self::Svg { page, .. } | Self::Size { page } => &page.file,
            Self::Count { file } => file,
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    match &cli.log_file {
        Some(path) => WriteLogger::init(
            level,
            Config::default(),
            File::create(path).with_context(|| format!("cannot create log file {path:?}"))?,
        )?,
        None => TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )?,
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<RasterConfig> {
    match &cli.config {
        Some(path) => RasterConfig::load(path).with_context(|| format!("loading {path:?}")),
        None => Ok(RasterConfig::load_or_default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    panic_handler::initialize_panic_handler();

    let config = load_config(&cli)?;
    let file = cli.command.file().clone();
    info!("Opening {file:?}");

    let raster = Rasterizer::with_config(file.clone(), api::default_backend(), config);
    raster
        .start()
        .with_context(|| format!("cannot open {file:?}"))?;

    let result = run(&raster, &cli.command);
    raster.stop();
    result
}

fn run(raster: &Rasterizer, command: &Command) -> Result<()> {
    match command {
        Command::Render { page, output } => {
            let img = raster
                .render_image(usize::from(page.page), page.size())
                .with_context(|| format!("rendering page {}", page.page))?;
            img.save_with_format(output, ImageFormat::Png)
                .with_context(|| format!("writing {output:?}"))?;
            info!(
                "Wrote page {} ({}x{}) to {output:?}",
                page.page,
                img.width(),
                img.height()
            );
        }

        Command::Svg { page, output } => {
            let svg = raster
                .render_vector(usize::from(page.page), page.size())
                .with_context(|| format!("rendering page {}", page.page))?;
            match output {
                Some(path) => {
                    std::fs::write(path, svg).with_context(|| format!("writing {path:?}"))?;
                }
                None => io::stdout().write_all(svg.as_bytes())?,
            }
        }

        Command::Count { .. } => {
            let count = raster.page_count().context("document is not open")?;
            println!("{count}");
        }

        Command::Size { page } => {
            let resolved = raster
                .resolve(usize::from(page.page), page.size())
                .with_context(|| format!("resolving page {}", page.page))?;
            println!("{}x{}", resolved.width_px, resolved.height_px);
        }
    }
    Ok(())
}
