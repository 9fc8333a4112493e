/*!
 * Deterministic synthetic training data.
 *
 * Both generators are used when a train request carries no data of its own.
 */

use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::models::{Interaction, Observation, Product};

const BASE_LOAD: f64 = 100.0;
const HOLIDAY_COUNT: usize = 5;
const HOLIDAY_FACTOR: f64 = 0.7;
const SPIKE_COUNT: usize = 3;
const SPIKE_FACTOR: f64 = 1.5;
const GROWTH: f64 = 15.0;
const NOISE_SIGMA: f64 = 5.0;

/// Generates `days * 24 + 1` hourly demand values ending at `end`, truncated to the hour.
pub fn sample_demand_series(end: DateTime<Utc>, days: usize, seed: u64) -> Vec<Observation> {
    let end = end.duration_trunc(Duration::hours(1)).unwrap_or(end);
    let len = days * 24 + 1;
    let start = end - Duration::hours((len - 1) as i64);

    let mut rng = StdRng::seed_from_u64(seed);

    let mut values: Vec<f64> = (0..len)
        .map(|i| {
            let ds = start + Duration::hours(i as i64);
            let hour_effect = (std::f64::consts::PI * ds.hour() as f64 / 12.0).sin() * 30.0;
            let weekday_effect = if ds.weekday().num_days_from_monday() < 5 {
                20.0
            } else {
                0.0
            };
            let month = ds.month() as f64;
            let temp_effect = (6.5 - (month - 6.5).abs()) * 5.0;
            let growth = if len > 1 {
                GROWTH * i as f64 / (len - 1) as f64
            } else {
                0.0
            };
            let noise: f64 = rng.sample(StandardNormal);
            BASE_LOAD + hour_effect + weekday_effect + temp_effect + NOISE_SIGMA * noise + growth
        })
        .collect();

    for idx in index::sample(&mut rng, len, HOLIDAY_COUNT.min(len)) {
        values[idx] *= HOLIDAY_FACTOR;
    }
    for idx in index::sample(&mut rng, len, SPIKE_COUNT.min(len)) {
        values[idx] *= SPIKE_FACTOR;
    }

    values
        .into_iter()
        .enumerate()
        .map(|(i, y)| Observation::new(start + Duration::hours(i as i64), y))
        .collect()
}

/// The fixed ten-product renewable-energy catalog
pub fn sample_products() -> Vec<Product> {
    vec![
        Product::new(1, "Solar Panel 300W", "solar", 0.22, 250.0),
        Product::new(2, "Wind Turbine 1kW", "wind", 0.35, 1200.0),
        Product::new(3, "Home Battery 10kWh", "storage", 0.9, 3500.0),
        Product::new(4, "Solar Inverter 3kW", "solar", 0.97, 800.0),
        Product::new(5, "Smart Energy Monitor", "efficiency", 0.99, 150.0),
        Product::new(6, "Solar Water Heater", "solar", 0.75, 1800.0),
        Product::new(7, "Energy Efficient LED Bulbs (10pk)", "efficiency", 0.95, 30.0),
        Product::new(8, "Micro Hydro Generator", "hydro", 0.7, 2200.0),
        Product::new(9, "Biomass Stove", "biomass", 0.6, 450.0),
        Product::new(10, "Solar Charge Controller", "solar", 0.98, 120.0),
    ]
}

/// Fifteen ratings from five users over the sample catalog
pub fn sample_interactions() -> Vec<Interaction> {
    [
        (1, 1, 5.0),
        (1, 3, 4.0),
        (1, 5, 5.0),
        (2, 2, 5.0),
        (2, 4, 3.0),
        (2, 8, 4.0),
        (3, 1, 4.0),
        (3, 2, 3.0),
        (3, 10, 5.0),
        (4, 3, 5.0),
        (4, 6, 4.0),
        (4, 9, 2.0),
        (5, 5, 5.0),
        (5, 7, 4.0),
        (5, 10, 4.0),
    ]
    .into_iter()
    .map(|(user, product, rating)| Interaction::new(user, product, rating))
    .collect()
}
