use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use renewable_energy_api::{
    ml::{
        plotting::{render_forecast, PlotSize},
        sample_data::{sample_demand_series, sample_interactions, sample_products},
        ForecasterSettings, TrainedForecaster, TrainedRecommender,
    },
    models::{Interaction, Product},
};
use std::time::Duration;

// Forecaster fitting over growing histories
fn forecaster_fit_benchmark(c: &mut Criterion) {
    let end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let settings = ForecasterSettings::default();
    let mut group = c.benchmark_group("forecaster_fit");

    for days in [7usize, 30, 60].iter() {
        let series = sample_demand_series(end, *days, 42);
        group.bench_with_input(BenchmarkId::from_parameter(days), &series, |b, series| {
            b.iter(|| {
                let model = TrainedForecaster::fit(black_box(series.clone()), settings.clone());
                black_box(model)
            });
        });
    }

    group.finish();
}

fn forecast_benchmark(c: &mut Criterion) {
    let end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let Ok(model) =
        TrainedForecaster::fit(sample_demand_series(end, 30, 42), ForecasterSettings::default())
    else {
        return;
    };

    c.bench_function("forecast_week", |b| {
        b.iter(|| black_box(model.forecast(black_box(168))))
    });

    let Ok(forecast) = model.forecast(168) else {
        return;
    };
    c.bench_function("render_forecast_png", |b| {
        b.iter(|| {
            black_box(render_forecast(
                Some(model.history()),
                &forecast,
                PlotSize::default(),
            ))
        })
    });
}

// Synthetic catalog of `n` products rated by `n * 2` users
fn synthetic_ratings(n: i64) -> (Vec<Interaction>, Vec<Product>) {
    let products = (1..=n)
        .map(|id| Product::new(id, format!("Product {}", id), "solar", 0.5, 100.0))
        .collect();
    let interactions = (1..=n * 2)
        .flat_map(|user| {
            (0..5).map(move |k| {
                let product = (user * 7 + k * 13) % n + 1;
                Interaction::new(user, product, ((user + k) % 5 + 1) as f64)
            })
        })
        .collect();
    (interactions, products)
}

fn similarity_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("recommender_fit");

    group.bench_function("sample", |b| {
        let interactions = sample_interactions();
        b.iter(|| {
            black_box(TrainedRecommender::fit(
                black_box(&interactions),
                sample_products(),
            ))
        })
    });

    for size in [50i64, 200].iter() {
        let (interactions, products) = synthetic_ratings(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                black_box(TrainedRecommender::fit(
                    black_box(&interactions),
                    products.clone(),
                ))
            })
        });
    }

    group.finish();
}

fn recommendation_benchmark(c: &mut Criterion) {
    let (interactions, products) = synthetic_ratings(200);
    let Ok(model) = TrainedRecommender::fit(&interactions, products) else {
        return;
    };

    c.bench_function("recommend_for_user", |b| {
        b.iter(|| black_box(model.recommend_for_user(black_box(17), 10)))
    });
    c.bench_function("similar_products", |b| {
        b.iter(|| black_box(model.similar_products(black_box(42), 10)))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(20);
    targets =
        forecaster_fit_benchmark,
        forecast_benchmark,
        similarity_benchmark,
        recommendation_benchmark
}

criterion_main!(benches);
