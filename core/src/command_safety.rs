//! Commands that only read state and may run without review under the
//! allowlist policy.

const SEQUENCE_OPERATORS: [&str; 4] = ["&&", "||", ";", "|"];

pub fn is_known_safe_command(command: &[String]) -> bool {
    if is_safe_to_call_with_exec(command) {
        return true;
    }

    // `bash -lc "..."` is accepted when every command in the script is safe
    // on its own and the script uses nothing but plain sequencing.
    if let [bash, flag, script] = command
        && bash == "bash"
        && flag == "-lc"
        && let Some(commands) = parse_plain_script(script)
    {
        return !commands.is_empty() && commands.iter().all(|cmd| is_safe_to_call_with_exec(cmd));
    }

    false
}

fn is_safe_to_call_with_exec(command: &[String]) -> bool {
    let Some(cmd0) = command.first().map(String::as_str) else {
        return false;
    };

    match cmd0 {
        "cat" | "echo" | "grep" | "head" | "ls" | "pwd" | "tail" | "wc" | "which" => true,

        "find" => {
            // `find` can delete files or run arbitrary programs.
            const UNSAFE_FIND_OPTIONS: [&str; 9] = [
                "-exec", "-execdir", "-ok", "-okdir", "-delete", "-fls", "-fprint", "-fprint0",
                "-fprintf",
            ];
            !command
                .iter()
                .any(|arg| UNSAFE_FIND_OPTIONS.contains(&arg.as_str()))
        }

        "rg" => {
            // `--pre` runs an arbitrary preprocessor command.
            !command
                .iter()
                .any(|arg| arg == "--pre" || arg.starts_with("--pre="))
        }

        "git" => matches!(
            command.get(1).map(String::as_str),
            Some("branch" | "diff" | "log" | "show" | "status")
        ),

        _ => false,
    }
}

/// Splits `script` into commands joined by sequencing operators. Returns
/// `None` if the script relies on anything else the shell would interpret.
fn parse_plain_script(script: &str) -> Option<Vec<Vec<String>>> {
    // shlex treats newlines as whitespace and does not know about comments,
    // while bash treats both as command boundaries.
    if script.contains(['\n', '\r', '#']) {
        return None;
    }
    let words = shlex::split(script)?;
    let mut commands = Vec::new();
    let mut current = Vec::new();
    for word in words {
        if SEQUENCE_OPERATORS.contains(&word.as_str()) {
            if current.is_empty() {
                return None;
            }
            commands.push(std::mem::take(&mut current));
            continue;
        }
        if word.contains(['>', '<', '`', '$', '(', ')', '&', ';', '|']) {
            return None;
        }
        current.push(word);
    }
    if !current.is_empty() {
        commands.push(current);
    }
    Some(commands)
}
