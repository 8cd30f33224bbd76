use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use htmlpdf_lib::cdp::events::{ConsoleApiCalled, ExceptionThrown};
use htmlpdf_lib::{
    is_navigable_url, Config, Cookie, CreateOptions, HtmlPdfError, InputDescriptor, InputKind,
    LaunchConfig, NetworkConfig, OutputKind, ScreenshotOptions, Viewport,
};
use tracing::{info, warn};

use crate::cli::{Commands, RenderArgs};

/// Checks if a flag was present in the command-line arguments.
pub fn flag_present(args: &[String], flag: &str) -> bool {
    args.iter()
        .any(|arg| arg == flag || arg.starts_with(&format!("{flag}=")))
}

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/htmlpdf/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, HtmlPdfError> {
    let cfg = Config::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string());
        HtmlPdfError::Config(format!("Failed to read config {}: {}", loc, e))
    })?;

    cfg.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        HtmlPdfError::Config(prefix)
    })?;
    Ok(cfg)
}

/// The document to render, after resolving `@PATH` inputs.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub content: String,
    pub descriptor: InputDescriptor,
}

pub fn resolve_input(raw: &str) -> Result<ResolvedInput, HtmlPdfError> {
    if let Some(path) = raw.strip_prefix('@') {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HtmlPdfError::Config(format!("Failed to read input file {path}: {e}"))
        })?;
        return Ok(ResolvedInput {
            content,
            descriptor: InputDescriptor {
                kind: InputKind::File,
                value: path.to_string(),
            },
        });
    }

    let descriptor = if is_navigable_url(raw) {
        InputDescriptor {
            kind: InputKind::Url,
            value: raw.trim().to_string(),
        }
    } else {
        InputDescriptor {
            kind: InputKind::Html,
            value: format!("<{} bytes of inline HTML>", raw.len()),
        }
    };
    Ok(ResolvedInput {
        content: raw.to_string(),
        descriptor,
    })
}

/// Merge CLI arguments with the config file into request options, preferring
/// CLI values when the flag was given.
pub fn resolve_options(
    raw_args: &[String],
    command: &Commands,
    config: &Config,
) -> Result<CreateOptions, HtmlPdfError> {
    let render = command.render_args();

    let mut chrome_flags = config.chrome_flags.clone();
    chrome_flags.extend(render.chrome_flags.iter().cloned());

    let trigger_timeout = render
        .wait_timeout
        .map(Duration::from_millis)
        .unwrap_or(config.timeouts.trigger);
    let completion_trigger = render
        .wait_for
        .clone()
        .map(|trigger| trigger.with_timeout(trigger_timeout));

    let mut print = config.print.clone();
    let mut screenshot = ScreenshotOptions {
        viewport: config.viewport,
        format: config.screenshot_format,
        ..ScreenshotOptions::default()
    };
    match command {
        Commands::Pdf {
            landscape,
            print_background,
            ..
        } => {
            if *landscape {
                print.landscape = Some(true);
            }
            if *print_background {
                print.print_background = Some(true);
            }
        }
        Commands::Screenshot {
            viewport,
            full_page,
            format,
            quality,
            ..
        } => {
            if flag_present(raw_args, "--viewport") {
                screenshot.viewport = *viewport;
            }
            if flag_present(raw_args, "--format") {
                screenshot.format = (*format).into();
            }
            screenshot.full_page = *full_page;
            screenshot.quality = *quality;
        }
    }

    Ok(CreateOptions {
        host: render.host.clone().or_else(|| config.host.clone()),
        port: render.port.or(config.port),
        launch: LaunchConfig {
            chrome_path: render
                .chrome_path
                .clone()
                .or_else(|| config.chrome_path.clone()),
            chrome_flags,
            startup_timeout: config.timeouts.startup,
        },
        print,
        screenshot,
        completion_trigger,
        timeout: render.timeout.or(config.timeout),
        network: network_config(render),
    })
}

fn network_config(render: &RenderArgs) -> NetworkConfig {
    let mut network = NetworkConfig {
        clear_cache: render.clear_cache,
        cookies: render
            .cookies
            .iter()
            .map(|(name, value)| Cookie::new(name.as_str(), value.as_str()))
            .collect(),
        extra_headers: render.headers.iter().cloned().collect(),
        ..NetworkConfig::default()
    };
    if render.log_console {
        network.console_handler = Some(Arc::new(|message: &ConsoleApiCalled| {
            info!(target: "page", kind = %message.kind, "{}", message.text());
        }));
        network.exception_handler = Some(Arc::new(|thrown: &ExceptionThrown| {
            warn!(target: "page", "uncaught exception: {}", thrown.exception_details.message());
        }));
    }
    network
}

/// The viewport reported in the summary, for screenshots only.
pub fn reported_viewport(kind: OutputKind, options: &CreateOptions) -> Option<Viewport> {
    (kind == OutputKind::Screenshot).then_some(options.screenshot.viewport)
}

/// Output path for the rendered artifact, as given on the command line.
pub fn output_path(command: &Commands) -> PathBuf {
    command.render_args().output.clone()
}
