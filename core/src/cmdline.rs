//! Win32 command-line flattening
//!
//! `CreateProcessW` takes one command-line string rather than an argument
//! vector, so the spawner flattens `CommandBuf` contents with these rules:
//! arguments containing whitespace (or empty arguments) are wrapped in
//! double quotes, everything else is passed through verbatim.
//!
//! Known gap: embedded double-quote and trailing-backslash characters are
//! not escaped, so arguments containing a literal `"` do not survive the
//! round trip. Callers that need such arguments must pre-escape them.

/// Flatten arguments into one command-line string.
pub fn join_args<'a, I>(args: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut line = String::new();
    for arg in args {
        if !line.is_empty() {
            line.push(' ');
        }
        if needs_quoting(arg) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}

/// Split a command-line string by the same quoting rule `join_args` applies.
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                // an empty quoted argument is still an argument
                pending = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        args.push(current);
    }
    args
}

fn needs_quoting(arg: &str) -> bool {
    arg.is_empty() || arg.chars().any(|c| c == ' ' || c == '\t')
}
