use once_cell::sync::Lazy;
use regex::Regex;

/// Case-marker prefix carried by early LCA headers (`LCA_CASE_NUMBER`, ...).
const CASE_PREFIX: &str = "LCA_CASE_";
/// Form-number suffix carried by PERM headers (`PW_JOB_TITLE_9089`, ...).
const FORM_SUFFIX: &str = "_9089";

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").expect("year regex should parse"));

/// Trim, uppercase, spaces → underscores, then strip the known case prefix
/// and form suffix.
pub fn clean_column_name(raw: &str) -> String {
    let name = raw
        .trim_start_matches('\u{feff}')
        .trim()
        .to_uppercase()
        .replace(' ', "_");
    let name = name.strip_prefix(CASE_PREFIX).unwrap_or(&name);
    let name = name.strip_suffix(FORM_SUFFIX).unwrap_or(name);
    name.to_string()
}

/// `WORKSITE_CITY_1` → `WORKSITE_CITY`, but `ADDRESS_11` and `X1_1` are left alone.
pub fn strip_layout_suffix(name: &str) -> Option<&str> {
    let stem = name.strip_suffix("_1")?;
    match stem.chars().last() {
        Some(c) if c.is_ascii_digit() => None,
        _ => Some(stem),
    }
}

/// True for names ending in `_<digits>`, e.g. `WORKSITE_CITY_2`.
pub fn has_numeric_suffix(name: &str) -> bool {
    name.rsplit_once('_')
        .map(|(_, tail)| !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Lenient numeric parse: surrounding whitespace is ignored and anything
/// that is not a finite number yields `None`.
pub fn coerce_numeric(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Render a coerced number; integral values print without a fraction.
pub fn format_number(value: f64) -> String {
    value.to_string()
}

/// First run of four digits in a file name, e.g. `2019_LCA.csv` → 2019.
pub fn extract_year_from_filename(filename: &str) -> Option<u16> {
    YEAR_RE.find(filename).and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_column_name_normalizes_and_strips() {
        assert_eq!(clean_column_name("  Case Status "), "CASE_STATUS");
        assert_eq!(clean_column_name("LCA_CASE_NUMBER"), "NUMBER");
        assert_eq!(clean_column_name("pw_job_title_9089"), "PW_JOB_TITLE");
        assert_eq!(clean_column_name("\u{feff}CASE_NO"), "CASE_NO");
        // only the leading prefix and trailing suffix are removed
        assert_eq!(clean_column_name("X_LCA_CASE_9089_Y"), "X_LCA_CASE_9089_Y");
    }

    #[test]
    fn clean_column_name_is_idempotent() {
        for raw in ["Employer Name", "LCA_CASE_WAGE_RATE_FROM", "JOB_INFO_WORK_CITY_9089"] {
            let once = clean_column_name(raw);
            // a second pass must not strip anything further
            assert_eq!(clean_column_name(&once), once, "{raw}");
        }
    }

    #[test]
    fn layout_suffix_only_after_non_digit() {
        assert_eq!(strip_layout_suffix("WORKSITE_CITY_1"), Some("WORKSITE_CITY"));
        assert_eq!(strip_layout_suffix("WORKSITE_ADDRESS1_1"), None);
        assert_eq!(strip_layout_suffix("WORKSITE_CITY_11"), None);
        assert_eq!(strip_layout_suffix("WORKSITE_CITY"), None);
    }

    #[test]
    fn numeric_suffix_detection() {
        assert!(has_numeric_suffix("WORKSITE_CITY_2"));
        assert!(has_numeric_suffix("WAGE_RATE_OF_PAY_FROM_10"));
        assert!(!has_numeric_suffix("WORKSITE_ADDRESS1"));
        assert!(!has_numeric_suffix("CASE_"));
        assert!(!has_numeric_suffix("CASE"));
    }

    #[test]
    fn coerce_numeric_never_fails_loudly() {
        assert_eq!(coerce_numeric(" 60000"), Some(60000.0));
        assert_eq!(coerce_numeric("50000.5"), Some(50000.5));
        assert_eq!(coerce_numeric("bad-data"), None);
        assert_eq!(coerce_numeric(""), None);
        assert_eq!(coerce_numeric("NaN"), None);
        assert_eq!(coerce_numeric("inf"), None);
    }

    #[test]
    fn format_number_drops_integral_fraction() {
        assert_eq!(format_number(50000.0), "50000");
        assert_eq!(format_number(31.25), "31.25");
    }

    #[test]
    fn year_is_first_four_digit_run() {
        assert_eq!(extract_year_from_filename("2019_LCA.csv"), Some(2019));
        assert_eq!(extract_year_from_filename("PERM_FY2021_Q4.csv"), Some(2021));
        assert_eq!(extract_year_from_filename("LCA_FY17.csv"), None);
        assert_eq!(extract_year_from_filename("notes.csv"), None);
    }
}
