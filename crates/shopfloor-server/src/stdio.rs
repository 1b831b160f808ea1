//! Line-oriented stdio transport.
//!
//! Each non-blank stdin line is one `{"tool", "params"}` frame; each gets
//! exactly one envelope line on stdout, in request order. Requests are
//! handled one at a time, so response frames never interleave. EOF ends
//! the loop. Logging goes to stderr and never touches stdout.

use shopfloor_core::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::instance::ServerInstance;
use crate::request::parse_request;

/// Serve process stdin/stdout until EOF.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or stdout cannot be written.
pub async fn serve(instance: &ServerInstance) -> Result<()> {
    log::info!(
        "{} server reading requests on stdin ({} tools)",
        instance.domain(),
        instance.registry().tool_count()
    );
    serve_lines(instance, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Serve frames from `reader`, writing responses to `writer`.
///
/// # Errors
///
/// Returns an error on I/O failure of either stream.
pub async fn serve_lines<R, W>(instance: &ServerInstance, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Frames are read as raw bytes; invalid UTF-8 is a malformed request,
    // not a transport failure.
    let mut buf = Vec::new();
    let mut served = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let frame = trim_frame(&buf);
        if frame.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let envelope = match parse_request(frame) {
            Ok(call) => {
                log::debug!("stdio call: {}", call.tool);
                instance.dispatch(call).await
            }
            Err(envelope) => {
                log::debug!("rejected malformed frame");
                envelope
            }
        };

        let mut frame = envelope.encode()?;
        frame.push('\n');
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
        served += 1;
    }

    log::info!("stdin closed after {served} requests");
    Ok(())
}

/// Strip the line terminator (`\n` or `\r\n`) from a raw frame.
fn trim_frame(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::TransportMode;
    use serde_json::{Value, json};
    use shopfloor_core::{ErrorKind, ServerDomain};
    use shopfloor_store::DataStore;
    use shopfloor_store::fixtures::fixture_dir;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn instance(domain: ServerDomain) -> (TempDir, ServerInstance) {
        let dir = fixture_dir().unwrap();
        let store = Arc::new(DataStore::new(dir.path().to_path_buf()));
        let instance =
            ServerInstance::new(domain, store, domain.default_port(), TransportMode::Stdio).unwrap();
        (dir, instance)
    }

    async fn run(instance: &ServerInstance, input: &str) -> Vec<Value> {
        run_bytes(instance, input.as_bytes()).await
    }

    async fn run_bytes(instance: &ServerInstance, input: &[u8]) -> Vec<Value> {
        let mut out = Vec::new();
        serve_lines(instance, input, &mut out).await.unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_one_response_per_request_in_order() {
        let (_dir, instance) = instance(ServerDomain::Workforce);
        let input = concat!(
            r#"{"tool": "get_employee_skills", "params": {"employee_id": "E001"}}"#,
            "\n\n   \n",
            r#"{"tool": "get_employee_skills", "params": {"employee_id": "E999"}}"#,
            "\n",
            r#"{"tool": "get_workforce_metrics"}"#,
            "\n",
        );
        let frames = run(&instance, input).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["data"]["total_skills"], json!(2));
        assert_eq!(frames[1]["data"]["found"], json!(false));
        assert_eq!(frames[2]["success"], json!(true));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_frames() {
        let (_dir, instance) = instance(ServerDomain::Business);
        let frames = run(&instance, "garbage\n{\"tool\": \"nope\"}\n").await;
        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0]["error"]["kind"],
            json!(ErrorKind::MalformedRequest.as_str())
        );
        assert_eq!(frames[1]["error"]["kind"], json!(ErrorKind::UnknownTool.as_str()));
    }

    #[tokio::test]
    async fn test_invalid_utf8_frame_is_rejected_and_serving_continues() {
        let (_dir, instance) = instance(ServerDomain::Business);
        let input = b"{\"tool\":\"get_products\"}\n{\"tool\":\"get_\xff\"}\n{\"tool\":\"get_products\"}\n";
        let frames = run_bytes(&instance, input).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["data"]["total_products"], json!(3));
        assert_eq!(
            frames[1]["error"]["kind"],
            json!(ErrorKind::MalformedRequest.as_str())
        );
        assert_eq!(frames[2]["data"]["total_products"], json!(3));
    }

    #[tokio::test]
    async fn test_crlf_terminated_frames() {
        let (_dir, instance) = instance(ServerDomain::Business);
        let frames = run(&instance, "{\"tool\": \"get_products\"}\r\n\r\n").await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["success"], json!(true));
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let (_dir, instance) = instance(ServerDomain::Business);
        let frames = run(&instance, r#"{"tool": "get_products"}"#).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["data"]["total_products"], json!(3));
    }

    #[tokio::test]
    async fn test_empty_input_ends_cleanly() {
        let (_dir, instance) = instance(ServerDomain::Business);
        assert!(run(&instance, "").await.is_empty());
    }
}
