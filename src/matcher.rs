//! Price band filtering and ranking of scraped candidates

use tracing::warn;

use crate::models::{Candidate, EligibleSet, RawCandidate};

/// Parses a scraped price such as `"19.99"`, `"$1,299.00"` or `" 7 "`.
///
/// Returns `None` for anything that is not a finite, non-negative number.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();

    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
}

/// Keeps candidates priced within `[min_price, max_price]`, ranks them by
/// distance from `min_price` and returns the best [`EligibleSet::CAPACITY`].
///
/// Ties keep their discovery order. Candidates with a missing or
/// non-numeric price are dropped with a warning.
pub fn select(candidates: &[RawCandidate], min_price: f64, max_price: f64) -> EligibleSet {
    let mut in_band: Vec<Candidate> = candidates
        .iter()
        .filter_map(|raw| {
            let Some(price) = raw.price.as_deref().and_then(parse_price) else {
                warn!(name = %raw.name, price = ?raw.price, "Invalid price format, dropping candidate");
                return None;
            };

            (min_price..=max_price).contains(&price).then(|| Candidate {
                name: raw.name.clone(),
                price,
                url: raw.url.clone(),
            })
        })
        .collect();

    // sort_by is stable, so equal distances stay in discovery order
    in_band.sort_by(|a, b| {
        (a.price - min_price)
            .abs()
            .total_cmp(&(b.price - min_price).abs())
    });

    EligibleSet::from_ranked(in_band)
}
