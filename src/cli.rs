use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use htmlpdf_lib::{CompletionTrigger, ImageFormat, Viewport};

#[derive(Parser)]
#[command(name = "htmlpdf")]
#[command(
    version,
    about = "HtmlPdf - Render HTML or URLs to PDF or images with headless Chrome",
    long_about = "HtmlPdf\n\nModes:\n- pdf: print a page to PDF.\n- screenshot: capture a page as PNG/JPEG/WebP.\n\nINPUT is a URL (http, https, file, data), inline HTML, or @PATH to read HTML from a file.\nWithout --host/--port a local headless Chrome is launched and killed afterwards.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose (debug) logging on stderr")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) with defaults for browser, timeouts, viewport and print options; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a page to PDF
    Pdf {
        #[command(flatten)]
        render: RenderArgs,

        #[arg(long, help = "Landscape paper orientation")]
        landscape: bool,

        #[arg(long, help = "Print background graphics")]
        print_background: bool,
    },
    /// Capture a page as an image
    Screenshot {
        #[command(flatten)]
        render: RenderArgs,

        #[arg(
            long,
            default_value = "1920x1080",
            help = "Emulated viewport (WIDTHxHEIGHT)"
        )]
        viewport: Viewport,

        #[arg(long, help = "Capture the full scrollable page, not just the viewport")]
        full_page: bool,

        #[arg(long, value_enum, default_value = "png", help = "Image format")]
        format: ImageFormatArg,

        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100), help = "JPEG quality (0-100)")]
        quality: Option<u8>,
    },
}

/// Flags shared by both render modes.
#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    #[arg(help = "URL, inline HTML, or @PATH of an HTML file")]
    pub input: String,

    #[arg(short, long, value_name = "PATH", help = "Where to write the PDF/image")]
    pub output: PathBuf,

    #[arg(long, help = "Host of an already-running Chrome (remote debugging)")]
    pub host: Option<String>,

    #[arg(long, help = "Remote debugging port of an already-running Chrome")]
    pub port: Option<u16>,

    #[arg(long, value_name = "PATH", help = "Chrome/Chromium binary to launch (default: $CHROME_PATH, then PATH lookup)")]
    pub chrome_path: Option<PathBuf>,

    #[arg(
        long = "chrome-flag",
        value_name = "FLAG",
        allow_hyphen_values = true,
        help = "Extra flag for the launched browser (repeatable)"
    )]
    pub chrome_flags: Vec<String>,

    #[arg(
        long,
        value_parser = humantime::parse_duration,
        help = "Deadline for the whole operation (e.g. 30s, 1m); none by default"
    )]
    pub timeout: Option<Duration>,

    #[arg(
        long,
        value_name = "TRIGGER",
        help = "Wait before capture: timer, event:NAME[@SELECTOR], callback[:NAME], element:SELECTOR, variable[:NAME], lifecycle[:NAME]"
    )]
    pub wait_for: Option<CompletionTrigger>,

    #[arg(long, value_name = "MS", help = "Completion trigger timeout in milliseconds [default: 1000]")]
    pub wait_timeout: Option<u64>,

    #[arg(long, help = "Clear the browser cache before navigating")]
    pub clear_cache: bool,

    #[arg(long = "cookie", value_name = "NAME=VALUE", value_parser = parse_cookie, help = "Cookie to set before navigating (repeatable)")]
    pub cookies: Vec<(String, String)>,

    #[arg(long = "header", value_name = "NAME:VALUE", value_parser = parse_header, help = "Extra HTTP header (repeatable)")]
    pub headers: Vec<(String, String)>,

    #[arg(long, help = "Log page console messages and exceptions")]
    pub log_console: bool,

    #[arg(long = "format-output", value_enum, default_value = "json", help = "Summary format")]
    pub format_output: OutputFormat,

    #[arg(long, value_name = "PATH", help = "Write the summary to a file instead of stdout")]
    pub report: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ImageFormatArg {
    Png,
    Jpeg,
    Webp,
}

impl From<ImageFormatArg> for ImageFormat {
    fn from(arg: ImageFormatArg) -> Self {
        match arg {
            ImageFormatArg::Png => ImageFormat::Png,
            ImageFormatArg::Jpeg => ImageFormat::Jpeg,
            ImageFormatArg::Webp => ImageFormat::Webp,
        }
    }
}

fn parse_cookie(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME:VALUE, got '{raw}'")),
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

impl Commands {
    pub fn render_args(&self) -> &RenderArgs {
        match self {
            Commands::Pdf { render, .. } | Commands::Screenshot { render, .. } => render,
        }
    }
}
