//! CSV roster parsing.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::campaign::Recipient;

use super::RosterError;

/// E.164-ish phone check: optional leading +, 7 to 15 digits.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{7,15}$").unwrap());

/// Column name that identifies the phone number in a headered roster.
const PHONE_COLUMN: &str = "phone";

/// Parse a CSV roster into recipients.
///
/// Two layouts are accepted:
/// - Headered: first row names the columns; a `phone` column is required
///   and every other column becomes a template variable keyed by its
///   header name.
/// - Headerless two-column `phone,name` (the legacy upload format): the
///   second column maps to template variable `"1"`.
///
/// Blank lines are skipped. Duplicate phones are kept as-is here; the
/// store collapses them last-write-wins at campaign creation.
pub fn load_csv(input: &str) -> Result<Vec<Recipient>, RosterError> {
    let mut lines = input
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let Some((first_line_no, first_line)) = lines.next() else {
        return Err(RosterError::Empty);
    };

    let first_fields = split_fields(first_line);
    let phone_idx = first_fields
        .iter()
        .position(|f| f.eq_ignore_ascii_case(PHONE_COLUMN));

    let mut recipients = Vec::new();

    if let Some(phone_idx) = phone_idx {
        // Headered layout.
        let headers = first_fields;
        for (line_no, line) in lines {
            let fields = split_fields(line);
            if fields.len() < headers.len() {
                return Err(RosterError::MalformedRow {
                    line: line_no,
                    expected: headers.len(),
                    got: fields.len(),
                });
            }
            recipients.push(row_to_recipient(&headers, phone_idx, &fields, line_no)?);
        }
    } else if first_fields.len() == 2 && PHONE_RE.is_match(&normalize_phone(&first_fields[0])) {
        // Legacy headerless phone,name layout; the first row is data.
        recipients.push(legacy_recipient(&first_fields, first_line_no)?);
        for (line_no, line) in lines {
            let fields = split_fields(line);
            if fields.len() < 2 {
                return Err(RosterError::MalformedRow {
                    line: line_no,
                    expected: 2,
                    got: fields.len(),
                });
            }
            recipients.push(legacy_recipient(&fields, line_no)?);
        }
    } else {
        return Err(RosterError::MissingColumn(PHONE_COLUMN.to_string()));
    }

    if recipients.is_empty() {
        return Err(RosterError::Empty);
    }

    Ok(recipients)
}

fn row_to_recipient(
    headers: &[String],
    phone_idx: usize,
    fields: &[String],
    line_no: usize,
) -> Result<Recipient, RosterError> {
    let phone = normalize_phone(&fields[phone_idx]);
    if !PHONE_RE.is_match(&phone) {
        return Err(RosterError::InvalidPhone {
            line: line_no,
            value: fields[phone_idx].clone(),
        });
    }

    let mut variables = BTreeMap::new();
    for (idx, header) in headers.iter().enumerate() {
        if idx == phone_idx {
            continue;
        }
        variables.insert(header.clone(), fields[idx].clone());
    }

    Ok(Recipient { phone, variables })
}

fn legacy_recipient(fields: &[String], line_no: usize) -> Result<Recipient, RosterError> {
    let phone = normalize_phone(&fields[0]);
    if !PHONE_RE.is_match(&phone) {
        return Err(RosterError::InvalidPhone {
            line: line_no,
            value: fields[0].clone(),
        });
    }
    let mut variables = BTreeMap::new();
    variables.insert("1".to_string(), fields[1].clone());
    Ok(Recipient { phone, variables })
}

fn split_fields(line: &str) -> Vec<String> {
    line.split(',').map(|f| f.trim().to_string()).collect()
}

/// Strip spaces, dashes and parentheses so "+1 (555) 000-1111" validates.
fn normalize_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect()
}
