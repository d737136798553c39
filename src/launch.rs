//! Resolution of Docker `Entrypoint`/`Cmd` metadata into the `/singularity`
//! launcher script.
//!
//! Docker reports both directives as `null`, a bare string (legacy shell form),
//! or a JSON array (exec form). They are modelled as a [`Directive`] and folded
//! into a single shell line by [`resolve_launch_line`].
//!
//! Arguments are flattened by dropping quotes and brackets and turning commas
//! into spaces. An argument that itself contains a comma therefore comes out
//! split in two (`["echo", "a,b"]` → `echo a b`). Existing images depend on
//! this exact output, so it is kept as is.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Shell prefix used for directives declared as a single string.
const SHELL_WRAPPER: &str = "/bin/sh -c";

/// Forwards the arguments given to `singularity run` to the wrapped program.
pub const PASSTHROUGH: &str = "$@";

pub const SHEBANG: &str = "#!/bin/sh";

/// One of the two launch directives of an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Directive {
    #[default]
    Absent,
    /// Shell form, e.g. `"Cmd": "nginx -g daemon off;"`
    Scalar(String),
    /// Exec form, e.g. `"Cmd": ["nginx", "-g", "daemon off;"]`
    List(Vec<String>),
}

impl Directive {
    pub fn is_absent(&self) -> bool {
        matches!(self, Directive::Absent)
    }

    /// Flattens the directive into a command line, or `None` when absent.
    fn to_command_line(&self) -> Option<String> {
        match self {
            Directive::Absent => None,
            Directive::Scalar(command) => Some(format!("{} {}", SHELL_WRAPPER, strip(command))),
            Directive::List(args) => Some(
                args.iter()
                    .map(|arg| strip(arg))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        }
    }
}

impl From<Option<Value>> for Directive {
    fn from(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Directive::Absent,
            Some(Value::String(s)) if s.is_empty() || s == "null" => Directive::Absent,
            Some(Value::String(s)) => Directive::Scalar(s),
            Some(Value::Array(items)) if items.is_empty() => Directive::Absent,
            Some(Value::Array(items)) => Directive::List(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Some(other) => Directive::Scalar(other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Directive {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Value>::deserialize(deserializer).map(Directive::from)
    }
}

/// Removes serialization artifacts from a single argument.
fn strip(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '"' | '[' | ']'))
        .map(|c| if c == ',' { ' ' } else { c })
        .collect()
}

/// Picks the directive Docker itself would run and renders it as one shell
/// line ending in the argument passthrough.
///
/// A declared entrypoint always wins; the command is ignored entirely in that
/// case. Returns an empty string if neither is declared.
pub fn resolve_launch_line(entrypoint: &Directive, command: &Directive) -> String {
    let selected = if !entrypoint.is_absent() {
        entrypoint
    } else {
        command
    };

    match selected.to_command_line() {
        Some(line) => format!("{} {}", line, PASSTHROUGH),
        None => String::new(),
    }
}

/// Renders the complete launcher script.
pub fn render_launch_script(entrypoint: &Directive, command: &Directive) -> String {
    let line = resolve_launch_line(entrypoint, command);
    if line.is_empty() {
        format!("{}\n", SHEBANG)
    } else {
        format!("{}\n{}\n", SHEBANG, line)
    }
}
