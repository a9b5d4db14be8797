//! Personal sales aggregation

use chrono::{DateTime, TimeDelta, Utc};
use referral_common::Order;
use std::time::Duration;

/// Sales figures for one partner
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SalesSummary {
    /// Sum of all of the partner's order totals
    pub personal_sales: f64,
    /// Orders placed inside the trailing window
    pub order_count: u64,
    /// `personal_sales / order_count`, or 0 with no recent orders
    pub average_order_value: f64,
}

impl SalesSummary {
    /// Summarise the orders bought by `partner_id`.
    ///
    /// The window is a fixed span ending at `now` (not a calendar month).
    /// Orders without a timestamp count towards sales but never towards the
    /// windowed count. Non-finite totals are ignored.
    pub fn compute<'a, I>(partner_id: &str, orders: I, now: DateTime<Utc>, window: Duration) -> Self
    where
        I: IntoIterator<Item = &'a Order>,
    {
        let since = TimeDelta::from_std(window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut personal_sales = 0.0;
        let mut order_count = 0u64;
        for order in orders.into_iter().filter(|o| o.buyer_id == partner_id) {
            if order.total.is_finite() {
                personal_sales += order.total;
            }
            if order.created_at.is_some_and(|at| at > since) {
                order_count += 1;
            }
        }

        let average_order_value = if order_count == 0 {
            0.0
        } else {
            personal_sales / order_count as f64
        };

        Self {
            personal_sales,
            order_count,
            average_order_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    #[test]
    fn test_no_orders_is_zero_not_nan() {
        let summary = SalesSummary::compute("a", &Vec::<Order>::new(), Utc::now(), WINDOW);
        assert_eq!(summary, SalesSummary::default());
        assert!(summary.average_order_value.is_finite());
    }

    #[test]
    fn test_only_old_orders_keeps_average_zero() {
        let now = Utc::now();
        let orders = vec![Order::new("o1", "a", 50.0, now - TimeDelta::days(45))];
        let summary = SalesSummary::compute("a", &orders, now, WINDOW);
        assert!((summary.personal_sales - 50.0).abs() < 1e-9);
        assert_eq!(summary.order_count, 0);
        assert!(summary.average_order_value.abs() < f64::EPSILON);
    }

    #[test]
    fn test_window_and_buyer_filter() {
        let now = Utc::now();
        let orders = vec![
            Order::new("o1", "a", 10.0, now - TimeDelta::days(1)),
            Order::new("o2", "a", 30.0, now - TimeDelta::days(29)),
            Order::new("o3", "a", 20.0, now - TimeDelta::days(31)),
            Order::new("o4", "b", 99.0, now - TimeDelta::days(1)),
        ];
        let summary = SalesSummary::compute("a", &orders, now, WINDOW);
        assert!((summary.personal_sales - 60.0).abs() < 1e-9);
        assert_eq!(summary.order_count, 2);
        // All-time sales over recent order count
        assert!((summary.average_order_value - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_untimestamped_and_non_finite_orders() {
        let now = Utc::now();
        let mut undated = Order::new("o1", "a", 5.0, now);
        undated.created_at = None;
        let orders = vec![
            undated,
            Order::new("o2", "a", f64::NAN, now),
            Order::new("o3", "a", 15.0, now),
        ];
        let summary = SalesSummary::compute("a", &orders, now, WINDOW);
        assert!((summary.personal_sales - 20.0).abs() < 1e-9);
        assert_eq!(summary.order_count, 2);
        assert!((summary.average_order_value - 10.0).abs() < 1e-9);
    }
}
