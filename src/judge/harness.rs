//! Harness generation and subprocess execution.
//!
//! A harness is the candidate's source plus a small generated driver that
//! feeds each test case's input to `function_name` and prints a JSON
//! array of `{ok, value}` / `{ok, error}` results on stdout — one
//! subprocess invocation judges every case for a submission, rather than
//! one process per case.

use super::{CaseResult, ExecutionLimits, JudgeVerdict, Submission};
use crate::domain::{ProblemType, TestCase};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

pub fn build_harness(submission: &Submission<'_>) -> std::result::Result<String, String> {
    match submission.language {
        "python" => Ok(python_harness(submission.code, submission.function_name)),
        "javascript" => Ok(javascript_harness(submission.code, submission.function_name)),
        other => Err(format!("unsupported language '{other}'")),
    }
}

/// Autodetects the entry point (prefer a `Solution` class's first public
/// method, else the top-level `function_name`), and coerces stringified
/// JSON test inputs back into their native types before calling it (§4.6).
/// Grounded on the `class Solution` + `inspect.signature` detection used
/// by the LeetCode-style runner this judge's harness model descends from.
fn python_harness(code: &str, function_name: &str) -> String {
    format!(
        r#"import inspect
import json
import sys

{code}

def __duelcode_coerce(value):
    if isinstance(value, str):
        try:
            return __duelcode_coerce(json.loads(value))
        except (json.JSONDecodeError, ValueError):
            return value
    if isinstance(value, list):
        return [__duelcode_coerce(v) for v in value]
    if isinstance(value, dict):
        return {{k: __duelcode_coerce(v) for k, v in value.items()}}
    return value

def __duelcode_resolve_callable():
    solution_cls = globals().get("Solution")
    if solution_cls is not None and inspect.isclass(solution_cls):
        instance = solution_cls()
        for name in dir(instance):
            if name.startswith("_"):
                continue
            attr = getattr(instance, name)
            if callable(attr):
                return attr
    return globals().get("{function_name}")

def __duelcode_main():
    cases = json.loads(sys.argv[1])
    target = __duelcode_resolve_callable()
    results = []
    for case in cases:
        if target is None:
            results.append({{"ok": False, "error": "no callable solution found"}})
            continue
        coerced = __duelcode_coerce(case)
        args = coerced if isinstance(coerced, list) else [coerced]
        try:
            value = target(*args)
            results.append({{"ok": True, "value": value}})
        except Exception as exc:
            results.append({{"ok": False, "error": str(exc)}})
    print(json.dumps(results))

if __name__ == "__main__":
    __duelcode_main()
"#
    )
}

fn javascript_harness(code: &str, function_name: &str) -> String {
    format!(
        r#"{code}

function __duelcodeCoerce(value) {{
  if (typeof value === "string") {{
    try {{
      return __duelcodeCoerce(JSON.parse(value));
    }} catch (err) {{
      return value;
    }}
  }}
  if (Array.isArray(value)) {{
    return value.map(__duelcodeCoerce);
  }}
  if (value && typeof value === "object") {{
    const out = {{}};
    for (const key of Object.keys(value)) {{
      out[key] = __duelcodeCoerce(value[key]);
    }}
    return out;
  }}
  return value;
}}

function __duelcodeResolveCallable() {{
  if (typeof Solution !== "undefined") {{
    const instance = new Solution();
    const proto = Object.getPrototypeOf(instance);
    const methodName = Object.getOwnPropertyNames(proto).find(
      (name) => name !== "constructor" && !name.startsWith("_") && typeof instance[name] === "function"
    );
    if (methodName) {{
      return instance[methodName].bind(instance);
    }}
  }}
  if (typeof {function_name} === "function") {{
    return {function_name};
  }}
  return null;
}}

const cases = JSON.parse(process.argv[2]);
const results = [];
const target = __duelcodeResolveCallable();
for (const entry of cases) {{
  if (!target) {{
    results.push({{ ok: false, error: "no callable solution found" }});
    continue;
  }}
  const coerced = __duelcodeCoerce(entry);
  const args = Array.isArray(coerced) ? coerced : [coerced];
  try {{
    const value = target(...args);
    results.push({{ ok: true, value }});
  }} catch (err) {{
    results.push({{ ok: false, error: String(err && err.message ? err.message : err) }});
  }}
}}
console.log(JSON.stringify(results));
"#
    )
}

struct Interpreter {
    program: &'static str,
    extension: &'static str,
}

/// Node places the inputs argument at `process.argv[2]` (argv[1] is the
/// script path); Python's `sys.argv` has no program-name slot, so it
/// lands at `sys.argv[1]`. Both harnesses are written to match — the
/// subprocess invocation itself is identical either way: `<interpreter>
/// <source_path> <inputs_json>`.
fn interpreter_for(language: &str) -> std::result::Result<Interpreter, String> {
    match language {
        "python" => Ok(Interpreter { program: "python3", extension: "py" }),
        "javascript" => Ok(Interpreter { program: "node", extension: "js" }),
        other => Err(format!("unsupported language '{other}'")),
    }
}

pub async fn run_harness(
    language: &str,
    harness_source: &str,
    test_cases: &[TestCase],
    problem_type: &ProblemType,
    limits: ExecutionLimits,
) -> crate::Result<JudgeVerdict> {
    let interpreter = interpreter_for(language).map_err(crate::DuelError::Judge)?;

    let dir = tempfile::tempdir()
        .map_err(|e| crate::DuelError::Infrastructure(format!("failed to create judge scratch dir: {e}")))?;
    let source_path = dir.path().join(format!("solution.{}", interpreter.extension));
    tokio::fs::write(&source_path, harness_source)
        .await
        .map_err(|e| crate::DuelError::Infrastructure(format!("failed to write harness source: {e}")))?;

    let inputs: Vec<&serde_json::Value> = test_cases.iter().map(|c| &c.input).collect();
    let inputs_json = serde_json::to_string(&inputs)?;

    let mut command = Command::new(interpreter.program);
    command.arg(&source_path);
    command.arg(&inputs_json);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Ok(JudgeVerdict::SystemError {
                message: format!("failed to launch {}: {e}", interpreter.program),
            })
        }
    };

    let output = match tokio::time::timeout(limits.time_limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Ok(JudgeVerdict::SystemError {
                message: format!("failed to run submission: {e}"),
            })
        }
        Err(_) => return Ok(JudgeVerdict::TimeLimitExceeded),
    };
    let execution_time_ms = start.elapsed().as_millis() as u64;

    let stdout = truncate(&output.stdout, limits.max_output_bytes);
    let stderr = truncate(&output.stderr, limits.max_output_bytes);

    if !output.status.success() {
        return Ok(classify_failure(language, &stderr));
    }

    let raw_results: Vec<serde_json::Value> = match serde_json::from_slice(&stdout) {
        Ok(v) => v,
        Err(e) => {
            return Ok(JudgeVerdict::RuntimeError {
                message: format!("harness produced non-JSON output: {e}\nstderr: {stderr}"),
            })
        }
    };

    if raw_results.len() != test_cases.len() {
        return Ok(JudgeVerdict::SystemError {
            message: format!(
                "harness returned {} results for {} test cases",
                raw_results.len(),
                test_cases.len()
            ),
        });
    }

    let mut cases = Vec::with_capacity(test_cases.len());
    let mut all_passed = true;
    for (case, result) in test_cases.iter().zip(raw_results.into_iter()) {
        let ok = result.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
        if !ok {
            all_passed = false;
            cases.push(CaseResult {
                hidden: case.hidden,
                passed: false,
                actual_output: None,
                error: result.get("error").and_then(|v| v.as_str()).map(str::to_string),
            });
            continue;
        }

        let value = result.get("value").cloned().unwrap_or(serde_json::Value::Null);
        let passed = super::values_equal(&case.expected_output, &value, problem_type);
        all_passed &= passed;
        cases.push(CaseResult { hidden: case.hidden, passed, actual_output: Some(value), error: None });
    }

    if all_passed {
        Ok(JudgeVerdict::Accepted { cases, execution_time_ms })
    } else {
        Ok(JudgeVerdict::WrongAnswer { cases, execution_time_ms })
    }
}

fn truncate(bytes: &[u8], limit: usize) -> String {
    let slice = if bytes.len() > limit { &bytes[..limit] } else { bytes };
    String::from_utf8_lossy(slice).into_owned()
}

fn classify_failure(language: &str, stderr: &str) -> JudgeVerdict {
    let looks_like_syntax_error = match language {
        "python" => stderr.contains("SyntaxError") || stderr.contains("IndentationError"),
        "javascript" => stderr.contains("SyntaxError"),
        _ => false,
    };

    if looks_like_syntax_error {
        JudgeVerdict::CompileError { message: stderr.to_string() }
    } else {
        JudgeVerdict::RuntimeError { message: stderr.to_string() }
    }
}
