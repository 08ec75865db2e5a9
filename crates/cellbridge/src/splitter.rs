/// Removes blank lines and full-line comments from a raw batch.
///
/// Kept lines are returned unmodified, so indentation and trailing comments survive;
/// `None` means nothing is left to run.
#[must_use]
pub fn clean_batch(text: &str) -> Option<String> {
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let stripped = line.trim();
            !stripped.is_empty() && !stripped.starts_with('#')
        })
        .collect();
    if kept.is_empty() { None } else { Some(kept.join("\n")) }
}
