use proptest::prelude::*;
use renewable_energy_api::{
    ml::{sample_data::sample_products, TrainedRecommender},
    models::Interaction,
};

fn interactions_strategy() -> impl Strategy<Value = Vec<Interaction>> {
    prop::collection::vec((1i64..=8, 1i64..=10, 0u8..=5), 0..40).prop_map(|rows| {
        rows.into_iter()
            .map(|(user, product, rating)| Interaction::new(user, product, f64::from(rating)))
            .collect()
    })
}

fn fit(interactions: &[Interaction]) -> TrainedRecommender {
    TrainedRecommender::fit(interactions, sample_products()).unwrap()
}

proptest! {
    #[test]
    fn similarity_is_symmetric_with_unit_diagonal(interactions in interactions_strategy()) {
        let model = fit(&interactions);
        for a in 1..=10 {
            for b in 1..=10 {
                match (model.similarity(a, b), model.similarity(b, a)) {
                    (Some(ab), Some(ba)) => {
                        prop_assert!((ab - ba).abs() < 1e-12);
                        prop_assert!((-1.0..=1.0).contains(&ab));
                        if a == b {
                            prop_assert_eq!(ab, 1.0);
                        }
                    }
                    (None, None) => {}
                    other => prop_assert!(false, "asymmetric availability {:?}", other),
                }
            }
        }
    }

    #[test]
    fn similar_products_exclude_query_and_are_sorted(
        interactions in interactions_strategy(),
        product_id in 1i64..=10,
        n in 0usize..12,
    ) {
        let model = fit(&interactions);
        let similar = model.similar_products(product_id, n);
        prop_assert!(similar.len() <= n);
        prop_assert!(similar.iter().all(|s| s.product.id != product_id));
        prop_assert!(similar
            .windows(2)
            .all(|w| w[0].similarity_score >= w[1].similarity_score));
    }

    #[test]
    fn unseen_user_gets_catalog_head(interactions in interactions_strategy(), n in 0usize..12) {
        let model = fit(&interactions);
        let recs = model.recommend_for_user(999, n);
        let expected: Vec<i64> = sample_products().into_iter().take(n).map(|p| p.id).collect();
        let actual: Vec<i64> = recs.iter().map(|r| r.product.id).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn known_user_never_gets_rated_products(
        interactions in interactions_strategy(),
        user_id in 1i64..=8,
    ) {
        let model = fit(&interactions);
        let rated: Vec<i64> = interactions
            .iter()
            .filter(|i| i.user_id == user_id)
            .map(|i| i.product_id)
            .collect();
        let recs = model.recommend_for_user(user_id, 10);
        if !rated.is_empty() {
            prop_assert!(recs.iter().all(|r| !rated.contains(&r.product.id)));
            prop_assert!(recs.iter().all(|r| r.predicted_rating.is_some()));
        }
    }

    #[test]
    fn category_results_are_non_increasing_in_efficiency(n in 0usize..12) {
        let model = fit(&[]);
        for category in ["solar", "wind", "storage", "efficiency", "hydro", "biomass"] {
            let recs = model.recommend_by_category(category, n);
            prop_assert!(recs.len() <= n);
            prop_assert!(recs
                .windows(2)
                .all(|w| w[0].product.efficiency >= w[1].product.efficiency));
            prop_assert!(recs.iter().all(|r| r.product.category == category));
        }
    }
}
