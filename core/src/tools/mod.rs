pub(crate) mod context;
pub(crate) mod router;

use serde::Serialize;

use crate::exec::ExecError;
use crate::exec::ExecOutput;
use crate::tools::context::ToolOutput;

// Only content sent to the model is truncated; executors and event consumers
// see full output.
pub(crate) const MODEL_FORMAT_MAX_BYTES: usize = 10 * 1024; // 10 KiB
pub(crate) const MODEL_FORMAT_MAX_LINES: usize = 256; // lines
pub(crate) const MODEL_FORMAT_HEAD_LINES: usize = MODEL_FORMAT_MAX_LINES / 2;
pub(crate) const MODEL_FORMAT_TAIL_LINES: usize = MODEL_FORMAT_MAX_LINES - MODEL_FORMAT_HEAD_LINES; // 128
pub(crate) const MODEL_FORMAT_HEAD_BYTES: usize = MODEL_FORMAT_MAX_BYTES / 2;

/// Default output for a denied command when the reviewer gave no reason.
pub(crate) const DENIED_OUTPUT: &str = "exec command rejected by user";

/// Output recorded for a tool call the reviewer refused to run.
pub(crate) fn denied_output(custom_deny_message: Option<String>) -> ToolOutput {
    ToolOutput::failure(custom_deny_message.unwrap_or_else(|| DENIED_OUTPUT.to_string()))
}

/// Converts an executor result into the output the model sees. Non-zero exit
/// codes and recoverable executor errors are failures, not turn errors.
pub(crate) fn exec_result_to_output(result: Result<ExecOutput, ExecError>) -> ToolOutput {
    match result {
        Ok(output) => {
            let content = format_exec_output(&output);
            if output.exit_code == 0 {
                ToolOutput::success(content)
            } else {
                ToolOutput::failure(content)
            }
        }
        Err(err) => ToolOutput::failure(format!("execution error: {err}")),
    }
}

pub fn format_exec_output(exec_output: &ExecOutput) -> String {
    #[derive(Serialize)]
    struct ExecMetadata {
        exit_code: i32,
        duration_seconds: f32,
    }

    #[derive(Serialize)]
    struct ExecOutputPayload<'a> {
        output: &'a str,
        metadata: ExecMetadata,
    }

    // round to 1 decimal place
    let duration_seconds = ((exec_output.duration.as_secs_f32()) * 10.0).round() / 10.0;

    let formatted_output = truncate_for_model(&exec_output.aggregated_output());

    let payload = ExecOutputPayload {
        output: &formatted_output,
        metadata: ExecMetadata {
            exit_code: exec_output.exit_code,
            duration_seconds,
        },
    };

    serde_json::to_string(&payload).unwrap_or_else(|_| formatted_output.clone())
}

/// Head+tail truncation: keeps the beginning and the end of `s` with an
/// elision marker in between.
pub(crate) fn truncate_for_model(s: &str) -> String {
    let total_lines = s.lines().count();
    if s.len() <= MODEL_FORMAT_MAX_BYTES && total_lines <= MODEL_FORMAT_MAX_LINES {
        return s.to_string();
    }

    let segments: Vec<&str> = s.split_inclusive('\n').collect();
    let head_take = MODEL_FORMAT_HEAD_LINES.min(segments.len());
    let tail_take = MODEL_FORMAT_TAIL_LINES.min(segments.len().saturating_sub(head_take));
    let omitted = segments.len().saturating_sub(head_take + tail_take);

    let head_slice_end: usize = segments.iter().take(head_take).map(|segment| segment.len()).sum();
    let tail_slice_start: usize = s.len()
        - segments
            .iter()
            .rev()
            .take(tail_take)
            .map(|segment| segment.len())
            .sum::<usize>();
    let marker = format!("\n[... omitted {omitted} of {total_lines} lines ...]\n\n");

    let head_budget = MODEL_FORMAT_HEAD_BYTES.min(MODEL_FORMAT_MAX_BYTES.saturating_sub(marker.len()));
    let head_part = take_bytes_at_char_boundary(&s[..head_slice_end], head_budget);

    let mut result = String::with_capacity(MODEL_FORMAT_MAX_BYTES.min(s.len()));
    result.push_str(head_part);
    result.push_str(&marker);

    let remaining = MODEL_FORMAT_MAX_BYTES.saturating_sub(result.len());
    if remaining == 0 {
        return result;
    }

    let tail_part = take_last_bytes_at_char_boundary(&s[tail_slice_start..], remaining);
    result.push_str(tail_part);
    result
}

fn take_bytes_at_char_boundary(s: &str, maxb: usize) -> &str {
    if s.len() <= maxb {
        return s;
    }
    let mut end = maxb;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn take_last_bytes_at_char_boundary(s: &str, maxb: usize) -> &str {
    if s.len() <= maxb {
        return s;
    }
    let mut start = s.len() - maxb;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
