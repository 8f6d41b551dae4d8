use chrono::{DateTime, Utc};
use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;

/// `<prefix><base36 millis><4 random>` e.g. `TRKLZ3K9Q1A7F2Q`.
pub fn tracking_number(prefix: &str, now: DateTime<Utc>, rng: &mut impl Rng) -> String {
    let millis = now.timestamp_millis().max(0) as u64;
    let suffix = Alphanumeric.sample_string(rng, 4).to_ascii_uppercase();
    format!("{}{}{}", prefix, to_base36(millis), suffix)
}

/// `<prefix>-<yyyymmdd>-<6 digits>` e.g. `INV-20261016-042917`.
pub fn invoice_number(prefix: &str, now: DateTime<Utc>, rng: &mut impl Rng) -> String {
    format!("{}-{}-{:06}", prefix, now.format("%Y%m%d"), rng.gen_range(0..1_000_000))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_tracking_number_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();

        let tracking = tracking_number("TRK", now, &mut rng);

        assert!(tracking.starts_with("TRK"));
        assert!(tracking.contains(&to_base36(now.timestamp_millis() as u64)));
        assert_eq!(tracking.len(), 3 + to_base36(now.timestamp_millis() as u64).len() + 4);
        assert!(tracking.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_invoice_number_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();

        let invoice = invoice_number("INV", now, &mut rng);

        assert!(invoice.starts_with("INV-20261016-"));
        assert_eq!(invoice.len(), "INV-20261016-".len() + 6);
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
    }
}
