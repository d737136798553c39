//! Conversion of a container's `env` output into `/docker_environment`.

/// Host identity variables that must not become image defaults.
pub const EXCLUDED_KEYS: &[&str] = &["HOME", "HOSTNAME"];

/// Line appended to `/environment` so every Singularity shell picks up the
/// exported Docker environment.
pub const PROFILE_AMENDMENT: &str = ". /docker_environment";

fn key_of(line: &str) -> &str {
    line.split_once('=').map_or(line, |(key, _)| key)
}

/// Turns `KEY=VALUE` lines into `export KEY=VALUE` statements.
///
/// Keys listed in [`EXCLUDED_KEYS`] are dropped. Everything else is kept in
/// order and passed through byte for byte: values are neither quoted nor
/// validated.
///
/// Known limitation: a value containing whitespace or shell metacharacters
/// does not survive sourcing. `JAVA_OPTS=-Xmx1g -Xms1g` becomes
/// `export JAVA_OPTS=-Xmx1g -Xms1g`, which exports `-Xmx1g` and then fails on
/// `-Xms1g` as a variable name.
pub fn export_environment<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.as_ref())
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let key = key_of(line);
            !EXCLUDED_KEYS.iter().any(|excluded| *excluded == key)
        })
        .map(|line| format!("export {}", line))
        .collect()
}

/// Renders the sourceable file content for the given export statements.
pub fn render_environment_file(exports: &[String]) -> String {
    let mut content = String::new();
    for line in exports {
        content.push_str(line);
        content.push('\n');
    }
    content
}
