use serde_json::Value;
use tracing::info;

use super::exit::ExitCondition;
use super::OutputKind;
use crate::cdp::CdpSession;
use crate::options::CreateOptions;
use crate::{HtmlPdfError, Result};

/// Issues the terminal print or screenshot call and returns its base64
/// `data` exactly as reported.
pub(crate) async fn capture(
    session: &CdpSession,
    kind: OutputKind,
    options: &CreateOptions,
    exit: &ExitCondition,
) -> Result<String> {
    let (method, params) = match kind {
        OutputKind::Pdf => ("Page.printToPDF", serde_json::to_value(&options.print)?),
        OutputKind::Screenshot => ("Page.captureScreenshot", options.screenshot.capture_params()),
    };

    info!(method, "capturing output");
    let response = exit.guard(session.call(method, params)).await?;
    extract_data(method, &response)
}

fn extract_data(method: &str, response: &Value) -> Result<String> {
    response
        .get("data")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HtmlPdfError::protocol(method, -1, "response has no data field"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_is_passed_through_verbatim() {
        let data = extract_data("Page.printToPDF", &json!({"data": "JVBERi0xLjQK\n"})).unwrap();
        assert_eq!(data, "JVBERi0xLjQK\n");
    }

    #[test]
    fn missing_data_is_a_protocol_error() {
        let err = extract_data("Page.captureScreenshot", &json!({})).unwrap_err();
        assert!(matches!(err, HtmlPdfError::Protocol { .. }));
    }
}
