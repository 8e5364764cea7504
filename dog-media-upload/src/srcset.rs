use crate::{SrcSet, UploadResponse};

/// Build the responsive source descriptor of an upload response.
///
/// Keys made only of ASCII digits are pixel widths; each becomes a
/// `"<url> <width>w"` entry, ordered by ascending width and joined with `", "`.
/// Returns `None` when the response carries no width keys (only `default`).
pub fn compute_srcset(response: &UploadResponse) -> Option<SrcSet> {
    let mut entries: Vec<(u64, &str)> = response
        .iter()
        .filter(|(key, _)| key.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|(key, url)| key.parse::<u64>().ok().map(|width| (width, url)))
        .collect();

    if entries.is_empty() {
        return None;
    }

    entries.sort_by_key(|(width, _)| *width);
    let width = entries.iter().map(|(width, _)| *width).max().unwrap_or(0);
    let data = entries
        .iter()
        .map(|(width, url)| format!("{} {}w", url, width))
        .collect::<Vec<_>>()
        .join(", ");

    Some(SrcSet { data, width })
}
