//! Text row grammar of the bulk-insert (`COPY ... FROM STDIN`) protocol.
//!
//! Rows are newline-terminated, fields tab-separated. Inside a field,
//! backslash, tab, newline and carriage return are written as `\\`, `\t`,
//! `\n`, `\r`. An absent value is the two-character marker `\N`, distinct
//! from an empty string.
//!
//! Row layout is fixed: `(natural_key, lat, lon, fields_json)`.

use geodir_core::GeoRecord;

/// Null marker of the text format.
pub const NULL_MARKER: &str = "\\N";

/// Column list matching [`push_record`]'s field order.
pub const COPY_COLUMNS: &str = "siret, lat, lon, fields";

/// Append `value` to `out`, escaped. `None` writes the null marker.
pub fn push_field(out: &mut String, value: Option<&str>) {
    let Some(value) = value else {
        out.push_str(NULL_MARKER);
        return;
    };
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

/// Escape a single value into a new string.
pub fn escape(value: Option<&str>) -> String {
    let mut out = String::with_capacity(value.map_or(2, str::len));
    push_field(&mut out, value);
    out
}

/// Append one record as a complete row. An empty natural key is written as null.
pub fn push_record(out: &mut String, record: &GeoRecord) -> serde_json::Result<()> {
    let key = (!record.natural_key.is_empty()).then_some(record.natural_key.as_str());
    push_field(out, key);
    out.push('\t');
    out.push_str(&record.latitude.to_string());
    out.push('\t');
    out.push_str(&record.longitude.to_string());
    out.push('\t');
    push_field(out, Some(&record.attributes_json()?));
    out.push('\n');
    Ok(())
}

/// Serialize a batch into one payload.
pub fn encode_batch(records: &[GeoRecord]) -> serde_json::Result<String> {
    // Rough per-row guess; the attribute blob dominates.
    let mut out = String::with_capacity(records.len() * 512);
    for record in records {
        push_record(&mut out, record)?;
    }
    Ok(out)
}

/// Split one row (without its trailing newline) into unescaped fields.
///
/// `\N` as a whole field decodes to `None`. A backslash before any other
/// character yields that character, as the server does.
pub fn decode_row(line: &str) -> Vec<Option<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut raw_null = true;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\t' => {
                fields.push(finish_field(&mut current, raw_null));
                raw_null = true;
                continue;
            }
            '\\' => match chars.next() {
                Some('N') if current.is_empty() && raw_null => {
                    current.push_str(NULL_MARKER);
                    continue;
                }
                Some('t') => current.push('\t'),
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) => current.push(other),
                None => current.push('\\'),
            },
            c => current.push(c),
        }
        raw_null = false;
    }
    fields.push(finish_field(&mut current, raw_null));
    fields
}

fn finish_field(current: &mut String, raw_null: bool) -> Option<String> {
    let value = std::mem::take(current);
    if raw_null && value == NULL_MARKER {
        None
    } else {
        Some(value)
    }
}

/// Split a payload into rows and decode each.
pub fn decode_payload(payload: &str) -> impl Iterator<Item = Vec<Option<String>>> + '_ {
    payload
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(decode_row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodir_core::RawRecord;

    #[test]
    fn test_escape_control_characters() {
        assert_eq!(escape(Some("a\tb\nc\\d\re")), "a\\tb\\nc\\\\d\\re");
        assert_eq!(escape(None), "\\N");
        assert_eq!(escape(Some("")), "");
    }

    #[test]
    fn test_tab_newline_backslash_survive_round_trip() {
        let value = "tab\there\nnew line \\ back\\slash\r\n";
        let row = format!("{}\t{}", escape(Some(value)), escape(None));
        assert!(!row.contains('\n'));
        let fields = decode_row(&row);
        assert_eq!(fields, vec![Some(value.to_string()), None]);
    }

    #[test]
    fn test_literal_backslash_n_is_not_null() {
        // The two characters `\` `N` as data are escaped to `\\N`.
        let encoded = escape(Some("\\N"));
        assert_eq!(encoded, "\\\\N");
        assert_eq!(decode_row(&encoded), vec![Some("\\N".to_string())]);
        assert_eq!(decode_row("x\\N"), vec![Some("xN".to_string())]);
    }

    #[test]
    fn test_record_row_layout() {
        let raw = RawRecord::from_pairs([("SIRET", ""), ("name", "a\tb")]);
        let rec = GeoRecord::from_raw(&raw, 48.5, 2.25, "SIRET", &[]);
        let payload = encode_batch(std::slice::from_ref(&rec)).unwrap();
        assert!(payload.ends_with('\n'));

        let rows: Vec<_> = decode_payload(&payload).collect();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.len(), 4);
        assert_eq!(row[0], None);
        assert_eq!(row[1].as_deref(), Some("48.5"));
        assert_eq!(row[2].as_deref(), Some("2.25"));
        let fields: serde_json::Value = serde_json::from_str(row[3].as_deref().unwrap()).unwrap();
        assert_eq!(fields["name"], "a\tb");
    }
}
