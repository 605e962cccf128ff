//! Human-readable ticket numbers: `<DEPT>-<YEAR>-<NNNN>`.

const DEPARTMENT_CODES: [(&str, &str); 6] = [
    ("ICT", "ICT"),
    ("Personnel", "PERS"),
    ("Legal Services", "LEGAL"),
    ("Office of the SDS", "SDS"),
    ("Accounting Unit", "ACCT"),
    ("Supply Office", "SUP"),
];

pub const FALLBACK_CODE: &str = "GEN";

pub fn department_code(department_name: &str) -> &'static str {
    DEPARTMENT_CODES
        .iter()
        .find(|(name, _)| *name == department_name)
        .map(|(_, code)| *code)
        .unwrap_or(FALLBACK_CODE)
}

/// `ICT-2025-`, used both to build numbers and as the LIKE prefix.
pub fn number_prefix(code: &str, year: i32) -> String {
    format!("{code}-{year}-")
}

pub fn format_ticket_number(code: &str, year: i32, sequence: u32) -> String {
    format!("{}{:04}", number_prefix(code, year), sequence)
}

fn sequence_of(number: &str, prefix: &str) -> Option<u32> {
    number.strip_prefix(prefix)?.parse().ok()
}

/// Next number after the highest sequence among `existing` for this prefix.
/// Numbers with other prefixes or an unparsable tail are ignored.
pub fn next_ticket_number<'a>(
    code: &str,
    year: i32,
    existing: impl IntoIterator<Item = &'a str>,
) -> String {
    let prefix = number_prefix(code, year);
    let highest = existing
        .into_iter()
        .filter_map(|n| sequence_of(n, &prefix))
        .max()
        .unwrap_or(0);
    format_ticket_number(code, year, highest.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_department_codes() {
        assert_eq!(department_code("ICT"), "ICT");
        assert_eq!(department_code("Personnel"), "PERS");
        assert_eq!(department_code("Supply Office"), "SUP");
        assert_eq!(department_code("Library"), "GEN");
    }

    #[test]
    fn test_first_number_of_year() {
        assert_eq!(next_ticket_number("ICT", 2025, []), "ICT-2025-0001");
    }

    #[test]
    fn test_uses_highest_not_latest() {
        let existing = ["PERS-2025-0009", "PERS-2025-0012", "PERS-2025-0010"];
        assert_eq!(
            next_ticket_number("PERS", 2025, existing),
            "PERS-2025-0013"
        );
    }

    #[test]
    fn test_ignores_other_years_and_junk() {
        let existing = ["SDS-2024-0450", "SDS-2025-00x1", "SDS-2025-0002"];
        assert_eq!(next_ticket_number("SDS", 2025, existing), "SDS-2025-0003");
    }

    #[test]
    fn test_sequence_grows_past_four_digits() {
        assert_eq!(
            next_ticket_number("ICT", 2025, ["ICT-2025-9999"]),
            "ICT-2025-10000"
        );
    }
}
