use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use htmlpdf_lib::{
    Generator, HtmlPdfError, HtmlPdfOutput, OutputKind, RenderOutput, HTMLPDF_OUTPUT_VERSION,
};
use tracing::{debug, info};

use crate::cli::Commands;
use crate::formatting::{render_error, write_output};
use crate::settings::{
    load_config, output_path, reported_viewport, resolve_input, resolve_options,
};

/// Run the pdf or screenshot command.
pub async fn run_render(
    raw_args: &[String],
    config_path: Option<PathBuf>,
    command: Commands,
) -> ExitCode {
    let kind = match command {
        Commands::Pdf { .. } => OutputKind::Pdf,
        Commands::Screenshot { .. } => OutputKind::Screenshot,
    };
    let render = command.render_args();
    let format = render.format_output;
    let report = render.report.clone();

    let config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, report),
    };
    let options = match resolve_options(raw_args, &command, &config) {
        Ok(options) => options,
        Err(err) => return render_error(err, format, report),
    };
    let input = match resolve_input(&render.input) {
        Ok(input) => input,
        Err(err) => return render_error(err, format, report),
    };
    debug!(
        input = ?input.descriptor.kind,
        endpoint = ?options.endpoint(),
        trigger = ?options.completion_trigger,
        "resolved render options"
    );

    let generator = match Generator::new() {
        Ok(generator) => generator,
        Err(err) => return render_error(err, format, report),
    };

    let started = Instant::now();
    let result = match generator.create(&input.content, &options, kind).await {
        Ok(result) => result,
        Err(err) => return render_error(err, format, report),
    };

    let path = output_path(&command);
    let bytes = match write_artifact(&result, &path).await {
        Ok(bytes) => bytes,
        Err(err) => return render_error(err, format, report),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(path = %path.display(), bytes, elapsed_ms, "artifact written");

    let body = HtmlPdfOutput::Render(RenderOutput {
        version: HTMLPDF_OUTPUT_VERSION.to_string(),
        kind: kind.into(),
        input: input.descriptor,
        output_path: path,
        bytes,
        elapsed_ms,
        viewport: reported_viewport(kind, &options),
        trigger: options.completion_trigger.as_ref().map(ToString::to_string),
        response: result.response().cloned(),
    });
    if let Err(err) = write_output(&body, format, report.clone()) {
        return render_error(HtmlPdfError::Config(err.to_string()), format, report);
    }
    ExitCode::SUCCESS
}

async fn write_artifact(
    result: &htmlpdf_lib::CreateResult,
    path: &std::path::Path,
) -> Result<usize, HtmlPdfError> {
    let bytes = result.to_bytes()?.len();
    result.to_file(path).await?;
    Ok(bytes)
}
