//! Field canonicalisation for registry values.
//!
//! Every function here is total: malformed or missing input degrades to an
//! empty string or passes through unchanged. Registries carry inconsistent
//! data across hundreds of thousands of rows and one bad cell must never
//! abort a batch.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static POSTAL_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{5}").expect("postal code pattern is valid"));

/// Street-type abbreviations used by FINESS (`voie_type`) and their long form.
pub const STREET_TYPES: [(&str, &str); 32] = [
    ("R", "RUE"),
    ("PL", "PLACE"),
    ("RTE", "ROUTE"),
    ("AV", "AVENUE"),
    ("GR", "GRANDE RUE"),
    ("ALL", "ALLEE"),
    ("CHE", "CHEMIN"),
    ("QUA", "QUARTIER"),
    ("BD", "BOULEVARD"),
    ("PROM", "PROMENADE"),
    ("ZA", "ZONE ARTISANALE"),
    ("QU", "QUAI"),
    ("ESPA", "ESPACE"),
    ("IMP", "IMPASSE"),
    ("LD", "LIEU DIT"),
    ("SQ", "SQUARE"),
    ("LOT", "LOTISSEMENT"),
    ("ZAC", "ZONE D'AMENAGEMENT CONCERTE"),
    ("IMM", "IMMEUBLE"),
    ("RES", "RESIDENCE"),
    ("CRS", "COURS"),
    ("ESP", "ESPLANADE"),
    ("FG", "FAUBOURG"),
    ("CHS", "CHAUSSEE"),
    ("MTE", "MONTEE"),
    ("DOM", "DOMAINE"),
    ("PAS", "PASSAGE"),
    ("SEN", "SENTIER"),
    ("VAL", "VALLEE"),
    ("VOI", "VOIE"),
    ("PKG", "PARKING"),
    ("RLE", "RUELLE"),
];

const NATIONAL_TRUNK_PREFIX: char = '0';
const INTERNATIONAL_PREFIX: &str = "+33";

/// Replace the French trunk prefix `0` by `+33`. Already-international,
/// empty, and missing values pass through unchanged.
pub fn canonical_phone(raw: Option<&str>) -> Option<String> {
    let s = raw?;
    match s.strip_prefix(NATIONAL_TRUNK_PREFIX) {
        Some(rest) => Some(format!("{}{}", INTERNATIONAL_PREFIX, rest)),
        None => Some(s.to_string()),
    }
}

/// Phone formatter for hand-typed practitioner sheets. Dots and spaces are
/// dropped, then:
/// - `01`..`07` lose the trunk `0` and gain `+33`;
/// - an 11-digit `33…` gains `+`;
/// - a bare national number starting `1`..`7` gains `+33`.
///
/// Anything else, `+33…` included, is returned stripped but otherwise as is.
pub fn substitute_phone(raw: Option<&str>) -> Option<String> {
    let s: String = raw?.chars().filter(|c| *c != '.' && *c != ' ').collect();
    if s.is_empty() {
        return None;
    }
    let national_digit = |c: char| ('1'..='7').contains(&c);
    let mut chars = s.chars();
    let out = match (chars.next(), chars.next()) {
        (Some(NATIONAL_TRUNK_PREFIX), Some(d)) if national_digit(d) => {
            format!("{}{}", INTERNATIONAL_PREFIX, &s[1..])
        }
        _ if s.starts_with('+') => s,
        _ if s.starts_with("33") && s.len() == 11 => format!("+{s}"),
        (Some(d), _) if national_digit(d) => format!("{}{}", INTERNATIONAL_PREFIX, s),
        _ => s,
    };
    Some(out)
}

/// Restore the leading zero of a postal code truncated to 4 characters.
pub fn canonical_postal_code(raw: Option<&str>) -> Option<String> {
    let s = raw?;
    if s.chars().count() == 4 {
        Some(format!("0{}", s))
    } else {
        Some(s.to_string())
    }
}

/// Collapse runs of two or more space characters into one. Other whitespace
/// is left alone.
pub fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch == ' ' && out.ends_with(' ') {
            continue;
        }
        out.push(ch);
    }
    out
}

/// Collapse any whitespace run into one space.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip the artifacts a float-coercing tool leaves in text identifiers: a
/// literal null marker (`nan`, `None`, `NULL`) and a trailing `.0` after an
/// alphanumeric identifier. Registry files are read as text so fresh values never carry
/// these; CRM exports and hand-edited sheets sometimes do.
pub fn clean_numeric_artifact(raw: Option<&str>) -> String {
    let Some(s) = raw.map(str::trim) else {
        return String::new();
    };
    if s.eq_ignore_ascii_case("nan") || s == "None" || s.eq_ignore_ascii_case("null") {
        return String::new();
    }
    match s.strip_suffix(".0") {
        Some(head) if !head.is_empty() && head.chars().all(|c| c.is_ascii_alphanumeric()) => {
            head.to_string()
        }
        _ => s.to_string(),
    }
}

/// Expand an abbreviated street type. Unknown tokens pass through.
pub fn expand_street_type(token: &str) -> String {
    let t = token.trim();
    STREET_TYPES
        .iter()
        .find(|(abbr, _)| *abbr == t)
        .map(|(_, full)| full.to_string())
        .unwrap_or_else(|| t.to_string())
}

/// Build the single-line street address from FINESS address parts:
/// `<number><complement> <street type> <label>`.
pub fn assemble_address(
    number: Option<&str>,
    complement: Option<&str>,
    street_type: Option<&str>,
    label: Option<&str>,
) -> String {
    let number = clean_numeric_artifact(number);
    let complement = clean_numeric_artifact(complement);
    let street_type = street_type.map(expand_street_type).unwrap_or_default();
    let label = label.map(str::trim).unwrap_or_default();
    let joined = format!("{}{} {} {}", number, complement, street_type, label);
    collapse_whitespace(&joined)
}

/// Split a routing line (`"75001 PARIS"`, `"CEDEX 13008 MARSEILLE"`) into the
/// embedded 5-digit postal code and the city that follows it. Either part
/// is empty when absent.
pub fn split_routing_line(line: Option<&str>) -> (String, String) {
    let Some(line) = line else {
        return (String::new(), String::new());
    };
    let Some(m) = POSTAL_CODE.find(line) else {
        return (String::new(), String::new());
    };
    let rest = &line[m.end()..];
    // the city stops at a second 5-digit group, if any
    let city = match POSTAL_CODE.find(rest) {
        Some(next) => &rest[..next.start()],
        None => rest,
    };
    (m.as_str().to_string(), city.trim_matches(' ').to_string())
}

pub const ADDRESS_KEY_DELIMITER: char = '|';

/// Composite address key for the lab/SELAS address match: uppercase,
/// whitespace collapsed, punctuation stripped, then `|<postal code>`.
/// `None` when either part is missing.
pub fn address_match_key(street: Option<&str>, postal_code: Option<&str>) -> Option<String> {
    let street = street?;
    let postal_code = postal_code?;
    let upper = collapse_whitespace(&street.to_uppercase());
    let stripped: String = upper
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    let zip = clean_numeric_artifact(Some(postal_code));
    Some(format!("{}{}{}", stripped, ADDRESS_KEY_DELIMITER, zip.trim()))
}

/// Canonical form of a column header: NFC, trimmed.
pub fn normalize_header(h: &str) -> String {
    h.trim().nfc().collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_trunk_prefix_is_internationalised() {
        assert_eq!(
            canonical_phone(Some("0612345678")).as_deref(),
            Some("+33612345678")
        );
        assert_eq!(
            canonical_phone(Some("+33612345678")).as_deref(),
            Some("+33612345678")
        );
        assert_eq!(canonical_phone(Some("")).as_deref(), Some(""));
        assert_eq!(canonical_phone(None), None);
    }

    #[test]
    fn phone_normalisation_is_idempotent() {
        for raw in ["0612345678", "+33612345678", "", "612345678"] {
            let once = canonical_phone(Some(raw));
            let twice = canonical_phone(once.as_deref());
            assert_eq!(once, twice, "input {:?}", raw);
        }
    }

    #[test]
    fn substitute_phones_are_internationalised() {
        assert_eq!(substitute_phone(Some("06.12.34.56.78")).as_deref(), Some("+33612345678"));
        assert_eq!(substitute_phone(Some("612345678")).as_deref(), Some("+33612345678"));
        assert_eq!(substitute_phone(Some("33612345678")).as_deref(), Some("+33612345678"));
        assert_eq!(substitute_phone(Some("+33 6 12 34 56 78")).as_deref(), Some("+33612345678"));
        assert_eq!(substitute_phone(Some("331234567")).as_deref(), Some("+33331234567"));
        assert_eq!(substitute_phone(Some("0812345678")).as_deref(), Some("0812345678"));
        assert_eq!(substitute_phone(Some(" . ")), None);
        assert_eq!(substitute_phone(None), None);
    }

    #[test]
    fn postal_code_padding() {
        assert_eq!(canonical_postal_code(Some("1234")).as_deref(), Some("01234"));
        assert_eq!(canonical_postal_code(Some("12345")).as_deref(), Some("12345"));
        assert_eq!(canonical_postal_code(None), None);
        let once = canonical_postal_code(Some("1234"));
        assert_eq!(canonical_postal_code(once.as_deref()), once);
    }

    #[test]
    fn spaces_collapse_once_and_for_all() {
        assert_eq!(collapse_spaces("10  RUE   X"), "10 RUE X");
        assert_eq!(collapse_spaces(&collapse_spaces("A    B")), "A B");
        assert_eq!(collapse_spaces("A\t\tB"), "A\t\tB");
    }

    #[test]
    fn numeric_artifacts_are_removed() {
        assert_eq!(clean_numeric_artifact(Some("750012345.0")), "750012345");
        assert_eq!(clean_numeric_artifact(Some("nan")), "");
        assert_eq!(clean_numeric_artifact(Some("NaN")), "");
        assert_eq!(clean_numeric_artifact(None), "");
        assert_eq!(clean_numeric_artifact(Some("2A0001234")), "2A0001234");
        assert_eq!(clean_numeric_artifact(Some("10.05")), "10.05");
    }

    #[test]
    fn corsican_and_lettered_identifiers_lose_float_suffix() {
        assert_eq!(clean_numeric_artifact(Some("2A0001234.0")), "2A0001234");
        assert_eq!(clean_numeric_artifact(Some("2B0005678.0")), "2B0005678");
        assert_eq!(clean_numeric_artifact(Some("L2.0")), "L2");
        assert_eq!(clean_numeric_artifact(Some("1.2.0")), "1.2.0");
        assert_eq!(clean_numeric_artifact(Some(".0")), ".0");
    }

    #[test]
    fn street_types_expand_by_exact_token() {
        assert_eq!(expand_street_type("AV"), "AVENUE");
        assert_eq!(expand_street_type("ZAC"), "ZONE D'AMENAGEMENT CONCERTE");
        assert_eq!(expand_street_type("AVENUE"), "AVENUE");
        assert_eq!(expand_street_type("av"), "av");
    }

    #[test]
    fn address_is_assembled_from_parts() {
        assert_eq!(
            assemble_address(Some("12"), Some("B"), Some("BD"), Some("DE LA  GARE")),
            "12B BOULEVARD DE LA GARE"
        );
        assert_eq!(
            assemble_address(None, None, Some("R"), Some("DU PORT")),
            "RUE DU PORT"
        );
        assert_eq!(assemble_address(None, None, None, None), "");
    }

    #[test]
    fn routing_line_splits_postal_code_and_city() {
        assert_eq!(
            split_routing_line(Some("75001 PARIS")),
            ("75001".to_string(), "PARIS".to_string())
        );
        assert_eq!(
            split_routing_line(Some("13008 MARSEILLE CEDEX 08")),
            ("13008".to_string(), "MARSEILLE CEDEX 08".to_string())
        );
        assert_eq!(
            split_routing_line(Some("PARIS")),
            (String::new(), String::new())
        );
        assert_eq!(split_routing_line(None), (String::new(), String::new()));
    }

    #[test]
    fn address_key_uppercases_and_strips_punctuation() {
        assert_eq!(
            address_match_key(Some(" 10, rue  de l'Église "), Some("75001")).as_deref(),
            Some("10 RUE DE LÉGLISE|75001")
        );
        assert_eq!(
            address_match_key(Some("10 RUE X"), Some("75001.0")).as_deref(),
            Some("10 RUE X|75001")
        );
        assert_eq!(address_match_key(None, Some("75001")), None);
        assert_eq!(address_match_key(Some("10 RUE X"), None), None);
    }

    #[test]
    fn headers_are_trimmed_and_composed() {
        // "é" written as e + combining acute
        let decomposed = " Nume\u{301}ro d'e\u{301}tablissement ";
        assert_eq!(normalize_header(decomposed), "Numéro d'établissement");
    }
}
