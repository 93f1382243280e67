use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<date>\d{4}-\d{2}-\d{2})").unwrap());

/// Parse the `YYYY-MM-DD` prefix Snapchat puts on exported file names.
/// This is a secondary, lower-trust signal used only for disambiguation.
pub fn date_from_filename(path: &Path) -> Option<NaiveDate> {
    let basename = path.file_name().and_then(|n| n.to_str())?;
    let caps = PREFIX_RE.captures(basename)?;
    NaiveDate::parse_from_str(caps.name("date")?.as_str(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_prefix_dates() {
        let parsed = date_from_filename(&PathBuf::from("dir/2021-05-01 front.jpg"));
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2021, 5, 1));

        assert!(date_from_filename(&PathBuf::from("2019-12-31_main.mp4")).is_some());
        assert!(date_from_filename(&PathBuf::from("IMG_20210501.jpg")).is_none());
        assert!(date_from_filename(&PathBuf::from("front 2021-05-01.jpg")).is_none());
    }

    #[test]
    fn test_invalid_calendar_date() {
        assert!(date_from_filename(&PathBuf::from("2021-13-40 main.jpg")).is_none());
    }
}
