use rex_store::DealRecord;

/// Least-squares line fitted over `(sq_ft, amount)` points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedLine {
    pub slope: f64,
    pub intercept: f64,
}

impl FittedLine {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Ordinary least squares over `(x, y)` points. Returns `None` with fewer
/// than two points or when every `x` is identical (vertical line).
pub fn fit_line(points: &[(f64, f64)]) -> Option<FittedLine> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut covariance = 0.0;
    let mut variance = 0.0;
    for (x, y) in points {
        covariance += (x - mean_x) * (y - mean_y);
        variance += (x - mean_x) * (x - mean_x);
    }
    if variance == 0.0 || !variance.is_finite() {
        return None;
    }
    let slope = covariance / variance;
    let intercept = mean_y - slope * mean_x;
    if !slope.is_finite() || !intercept.is_finite() {
        return None;
    }
    Some(FittedLine { slope, intercept })
}

/// Predicts a deal amount at `sq_ft` from the user's deal history. Deals
/// without positive square footage and amount are skipped; fewer than two
/// usable deals means no prediction.
pub fn predict_deal_amount(deals: &[DealRecord], sq_ft: f64) -> Option<f64> {
    let points: Vec<(f64, f64)> = deals
        .iter()
        .filter(|deal| deal.sq_ft > 0.0 && deal.amount > 0.0)
        .map(|deal| (deal.sq_ft, deal.amount))
        .collect();
    fit_line(&points).map(|line| line.predict(sq_ft))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rex_store::DealType;

    fn deal(id: &str, sq_ft: f64, amount: f64) -> DealRecord {
        DealRecord {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            amount,
            close_date: "2026-01-15".to_string(),
            sq_ft,
            rent_month: None,
            sale_price: None,
            deal_type: DealType::Lease,
        }
    }

    #[test]
    fn regression_fit_recovers_a_known_line() {
        let points = [(1.0, 5.0), (2.0, 7.0), (3.0, 9.0), (4.0, 11.0)];
        let line = fit_line(&points).expect("fit");
        assert!((line.slope - 2.0).abs() < 1e-9);
        assert!((line.intercept - 3.0).abs() < 1e-9);
        assert!((line.predict(10.0) - 23.0).abs() < 1e-9);
    }

    #[test]
    fn unit_fit_rejects_degenerate_inputs() {
        assert!(fit_line(&[]).is_none());
        assert!(fit_line(&[(1.0, 2.0)]).is_none());
        // All points share an x coordinate.
        assert!(fit_line(&[(5.0, 1.0), (5.0, 2.0), (5.0, 3.0)]).is_none());
    }

    #[test]
    fn functional_prediction_skips_unusable_deals() {
        let deals = vec![
            deal("d-1", 1_000.0, 5_000.0),
            deal("d-2", 2_000.0, 9_000.0),
            deal("d-3", 0.0, 9_999.0),
            deal("d-4", 1_500.0, 0.0),
        ];
        let predicted = predict_deal_amount(&deals, 3_000.0).expect("prediction");
        // Exact line through the two usable deals: amount = 4*sq_ft + 1000.
        assert!((predicted - 13_000.0).abs() < 1e-6);
    }

    #[test]
    fn unit_prediction_requires_two_usable_deals() {
        let deals = vec![deal("d-1", 1_000.0, 5_000.0), deal("d-2", 0.0, 1.0)];
        assert!(predict_deal_amount(&deals, 2_000.0).is_none());
    }
}
