use compact_str::CompactString;

/// Placeholder written whenever a field cannot be extracted from the page.
pub const NOT_FOUND: &str = "Not found";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleInfo {
    pub vin: CompactString,
    pub year: Option<i32>,
    pub body: String,
    pub make: String,
    pub model: String,
    pub transmission: String,
}

impl VehicleInfo {
    #[must_use]
    pub fn not_found(vin: &str, year: Option<i32>) -> Self {
        Self {
            vin: vin.trim().into(),
            year,
            body: NOT_FOUND.to_owned(),
            make: NOT_FOUND.to_owned(),
            model: NOT_FOUND.to_owned(),
            transmission: NOT_FOUND.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleColor {
    pub vin: CompactString,
    pub color: String,
    pub interior: String,
}

impl VehicleColor {
    #[must_use]
    pub fn not_found(vin: &str) -> Self {
        Self {
            vin: vin.trim().into(),
            color: NOT_FOUND.to_owned(),
            interior: NOT_FOUND.to_owned(),
        }
    }
}

/// Reduces one extraction step to a stored value. `None` and the empty
/// string both collapse to [`NOT_FOUND`], so a record never carries an
/// absent field.
#[must_use]
pub fn or_not_found(value: Option<String>) -> String {
    match value {
        Some(s) if !s.trim().is_empty() => s,
        _ => NOT_FOUND.to_owned(),
    }
}

/// Collapses the free-form "Transmission Style" text to the two styles the
/// destination table cares about. Everything else (CVT, dual-clutch, empty)
/// falls through to the sentinel.
#[must_use]
pub fn normalize_transmission(raw: &str) -> &'static str {
    if raw.contains("Automatic") {
        "Automatic"
    } else if raw.contains("Manual") {
        "Manual"
    } else {
        NOT_FOUND
    }
}

/// Batch-local dedup: keeps the first record seen for each VIN. Duplicates
/// across batches or concurrent runs are not this function's problem.
pub fn dedup_by_vin<T>(records: &mut Vec<T>, vin: impl Fn(&T) -> &str) {
    let mut seen = hashbrown::HashSet::with_capacity(records.len());
    records.retain(|r| seen.insert(CompactString::from(vin(r))));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmission_normalization() {
        assert_eq!(normalize_transmission("5-Speed Automatic"), "Automatic");
        assert_eq!(normalize_transmission("6-Speed Manual"), "Manual");
        assert_eq!(normalize_transmission("CVT"), NOT_FOUND);
        assert_eq!(normalize_transmission(""), NOT_FOUND);
    }

    #[test]
    fn reducer_never_yields_empty() {
        assert_eq!(or_not_found(None), NOT_FOUND);
        assert_eq!(or_not_found(Some(String::new())), NOT_FOUND);
        assert_eq!(or_not_found(Some("  ".to_owned())), NOT_FOUND);
        assert_eq!(or_not_found(Some("Sedan".to_owned())), "Sedan");
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut records = vec![
            VehicleColor {
                vin: "1HGCM82633A004352".into(),
                color: "Silver".to_owned(),
                interior: "Black".to_owned(),
            },
            VehicleColor::not_found("5YJSA1E26JF000001"),
            VehicleColor::not_found("1HGCM82633A004352"),
        ];
        dedup_by_vin(&mut records, |r| &r.vin);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].color, "Silver");
        assert_eq!(records[1].vin, "5YJSA1E26JF000001");
    }

    #[test]
    fn sentinel_record_keeps_identity() {
        let info = VehicleInfo::not_found(" 1HGCM82633A004352 ", Some(2003));
        assert_eq!(info.vin, "1HGCM82633A004352");
        assert_eq!(info.year, Some(2003));
        for field in [&info.body, &info.make, &info.model, &info.transmission] {
            assert_eq!(field, NOT_FOUND);
        }
    }
}
