use chrono::DateTime;

/// Length of the container id suffix, same as `docker ps` short ids.
const SHORT_ID_LEN: usize = 12;

/// Converts a Docker image reference into something usable as a file name.
/// `:` and `@` become `-`, `/` becomes `_`, and anything else outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub fn image_to_basename(image_name: &str) -> String {
    image_name
        .chars()
        .map(|c| match c {
            ':' | '@' => '-',
            '/' => '_',
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => c,
            _ => '_',
        })
        .collect()
}

/// Reduces a Docker creation timestamp to its `YYYY-MM-DD` date.
/// Falls back to the first ten characters if the timestamp is not RFC 3339.
pub fn creation_date(created: &str) -> String {
    match DateTime::parse_from_rfc3339(created) {
        Ok(timestamp) => timestamp.format("%Y-%m-%d").to_string(),
        Err(_) => created.chars().take(10).collect(),
    }
}

/// Builds the target image name `<image>-<date>-<short container id>`.
pub fn target_image_name(image_name: &str, created: &str, container_id: &str) -> String {
    let short_id: String = container_id.chars().take(SHORT_ID_LEN).collect();
    format!(
        "{}-{}-{}",
        image_to_basename(image_name),
        creation_date(created),
        short_id
    )
}
