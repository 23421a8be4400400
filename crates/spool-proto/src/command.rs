//! Request line tokenising.
//!
//! A request is one `\n`-terminated line, with an optional `\r` before the
//! newline. Parameters are separated by single spaces, so consecutive spaces
//! produce empty parameters; handlers decide whether an empty value is valid.

/// Strip the line terminator and split a request line into parameters.
///
/// The first parameter is the command name. An empty line yields a single
/// empty parameter.
pub fn split_params(line: &str) -> Vec<&str> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.split(' ').collect()
}
