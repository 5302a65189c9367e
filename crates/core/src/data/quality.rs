//! Data quality scoring for provider responses.

use chrono::{DateTime, Utc};
use finrelay_market_data::DataPoint;

/// Number of OHLCV fields a complete bar carries.
const OHLCV_FIELDS: f64 = 5.0;

/// Below this score a warning is attached to the response.
pub const LOW_QUALITY_THRESHOLD: f64 = 0.5;

/// Quality score plus any warnings raised while computing it.
#[derive(Clone, Debug, PartialEq)]
pub struct QualityReport {
    pub score: f64,
    pub warnings: Vec<String>,
}

/// Score of a single point: fraction of OHLCV fields populated, 0 when the
/// point has no symbol.
pub fn point_quality(point: &DataPoint) -> f64 {
    if point.symbol.trim().is_empty() {
        return 0.0;
    }
    point.populated_ohlcv_fields() as f64 / OHLCV_FIELDS
}

/// Mean point quality in [0, 1]. An empty response scores 0.
pub fn assess(points: &[DataPoint]) -> QualityReport {
    assess_at(points, Utc::now())
}

/// [`assess`] against an explicit clock. Points dated after `now` score 0.
pub fn assess_at(points: &[DataPoint], now: DateTime<Utc>) -> QualityReport {
    if points.is_empty() {
        return QualityReport {
            score: 0.0,
            warnings: vec!["No data returned".to_string()],
        };
    }

    let score = points
        .iter()
        .map(|p| if p.timestamp > now { 0.0 } else { point_quality(p) })
        .sum::<f64>()
        / points.len() as f64;

    let mut warnings = Vec::new();
    let missing_symbol = points.iter().filter(|p| p.symbol.trim().is_empty()).count();
    if missing_symbol > 0 {
        warnings.push(format!("{missing_symbol} data points have no symbol"));
    }
    let future_dated = points.iter().filter(|p| p.timestamp > now).count();
    if future_dated > 0 {
        warnings.push(format!("{future_dated} data points are dated in the future"));
    }
    if score < LOW_QUALITY_THRESHOLD {
        warnings.push(format!(
            "Low data quality: {:.0}% of OHLCV fields populated",
            score * 100.0
        ));
    }

    QualityReport { score, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn full(symbol: &str) -> DataPoint {
        DataPoint::ohlcv(
            symbol,
            Utc::now(),
            dec!(1),
            dec!(2),
            dec!(0.5),
            dec!(1.5),
            dec!(100),
        )
    }

    #[test]
    fn test_complete_points_score_one() {
        let report = assess(&[full("000001"), full("600519")]);
        assert_eq!(report.score, 1.0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_partial_points() {
        let mut partial = DataPoint::new("000001", Utc::now());
        partial.close = Some(dec!(10));
        partial.volume = Some(dec!(5));

        assert!((point_quality(&partial) - 0.4).abs() < 1e-9);
        let report = assess(&[full("000001"), partial]);
        assert!((report.score - 0.7).abs() < 1e-9);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_missing_symbol_zeroes_point() {
        let mut nameless = full("x");
        nameless.symbol = String::new();

        assert_eq!(point_quality(&nameless), 0.0);
        let report = assess(&[nameless]);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_future_dated_points_are_penalized() {
        let current = full("000001");
        let mut ahead = full("000001");
        let now = Utc::now();
        ahead.timestamp = now + Duration::hours(2);

        let report = assess_at(&[current, ahead], now);
        assert!((report.score - 0.5).abs() < 1e-9);
        assert_eq!(
            report.warnings,
            vec!["1 data points are dated in the future".to_string()]
        );

        let report = assess_at(&[full("000001")], Utc::now() + Duration::seconds(1));
        assert_eq!(report.score, 1.0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_empty_response() {
        let report = assess(&[]);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.warnings, vec!["No data returned".to_string()]);
    }
}
