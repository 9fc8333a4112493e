/*!
 * # Product Recommendation Engine
 *
 * Item-item collaborative filtering over explicit ratings.
 *
 * Users and products that appear in the interactions get dense indices in
 * ascending id order. Ratings are kept sparse per user, so an explicit rating
 * of 0 still marks a product as rated. Similarity between two products is the
 * cosine of their rating columns.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};
use validator::Validate;

use super::ModelError;
use crate::models::{Interaction, Product, Recommendation, SimilarProduct};

/// Persisted form of a trained recommender
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommenderState {
    products: Vec<Product>,
    user_ids: Vec<i64>,
    product_ids: Vec<i64>,
    /// Per user row: (product column, rating), sorted by column
    ratings: Vec<Vec<(usize, f64)>>,
    similarity: Vec<Vec<f64>>,
    trained_at: DateTime<Utc>,
}

/// A fitted recommender. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RecommenderState", into = "RecommenderState")]
pub struct TrainedRecommender {
    state: RecommenderState,
    catalog_index: HashMap<i64, usize>,
}

impl From<RecommenderState> for TrainedRecommender {
    fn from(state: RecommenderState) -> Self {
        let catalog_index = state
            .products
            .iter()
            .enumerate()
            .map(|(pos, p)| (p.id, pos))
            .collect();
        Self {
            state,
            catalog_index,
        }
    }
}

impl From<TrainedRecommender> for RecommenderState {
    fn from(model: TrainedRecommender) -> Self {
        model.state
    }
}

fn by_score_then_id(a: &(i64, f64), b: &(i64, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

fn validate_catalog(products: &[Product]) -> Result<(), ModelError> {
    let mut seen = HashSet::with_capacity(products.len());
    for product in products {
        if !seen.insert(product.id) {
            return Err(ModelError::InvalidInput(format!(
                "duplicate product id {}",
                product.id
            )));
        }
        if !(product.efficiency.is_finite() && product.price.is_finite()) {
            return Err(ModelError::InvalidInput(format!(
                "product {} has a non-finite efficiency or price",
                product.id
            )));
        }
        product.validate().map_err(|e| {
            ModelError::InvalidInput(format!("product {}: {}", product.id, e))
        })?;
    }
    Ok(())
}

impl TrainedRecommender {
    /// Builds the rating matrix and item similarities.
    ///
    /// Every interaction must reference a catalog product. When a user rates the
    /// same product twice the later rating wins.
    pub fn fit(interactions: &[Interaction], products: Vec<Product>) -> Result<Self, ModelError> {
        validate_catalog(&products)?;

        let catalog: HashSet<i64> = products.iter().map(|p| p.id).collect();
        for interaction in interactions {
            if !interaction.rating.is_finite() || interaction.rating < 0.0 {
                return Err(ModelError::InvalidInput(format!(
                    "rating for user {} product {} must be a finite non-negative number",
                    interaction.user_id, interaction.product_id
                )));
            }
            if !catalog.contains(&interaction.product_id) {
                return Err(ModelError::InvalidInput(format!(
                    "interaction references unknown product {}",
                    interaction.product_id
                )));
            }
        }

        let mut user_ids: Vec<i64> = interactions.iter().map(|i| i.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        let mut product_ids: Vec<i64> = interactions.iter().map(|i| i.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let mut cells: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        let mut duplicates = 0usize;
        for interaction in interactions {
            // both ids were collected from this same slice
            let (Ok(row), Ok(col)) = (
                user_ids.binary_search(&interaction.user_id),
                product_ids.binary_search(&interaction.product_id),
            ) else {
                continue;
            };
            if cells.insert((row, col), interaction.rating).is_some() {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            warn!(
                duplicates,
                "Repeated user/product ratings found; keeping the last rating"
            );
        }

        let mut ratings: Vec<Vec<(usize, f64)>> = vec![Vec::new(); user_ids.len()];
        for ((row, col), rating) in cells {
            ratings[row].push((col, rating));
        }

        let similarity = cosine_similarity(&ratings, product_ids.len());

        info!(
            users = user_ids.len(),
            rated_products = product_ids.len(),
            catalog = products.len(),
            ratings = interactions.len() - duplicates,
            "Recommender fitted"
        );

        Ok(RecommenderState {
            products,
            user_ids,
            product_ids,
            ratings,
            similarity,
            trained_at: Utc::now(),
        }
        .into())
    }

    pub fn products(&self) -> &[Product] {
        &self.state.products
    }

    pub fn product(&self, product_id: i64) -> Option<&Product> {
        self.catalog_index
            .get(&product_id)
            .map(|&pos| &self.state.products[pos])
    }

    pub fn user_count(&self) -> usize {
        self.state.user_ids.len()
    }

    pub fn rated_product_count(&self) -> usize {
        self.state.product_ids.len()
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.state.trained_at
    }

    /// Cosine similarity between two products, if both have been rated
    pub fn similarity(&self, a: i64, b: i64) -> Option<f64> {
        let i = self.state.product_ids.binary_search(&a).ok()?;
        let j = self.state.product_ids.binary_search(&b).ok()?;
        Some(self.state.similarity[i][j])
    }

    /// The `n` products most similar to `product_id`, excluding itself.
    ///
    /// Unknown products yield an empty list.
    pub fn similar_products(&self, product_id: i64, n: usize) -> Vec<SimilarProduct> {
        let Ok(row) = self.state.product_ids.binary_search(&product_id) else {
            return Vec::new();
        };

        let mut scored: Vec<(i64, f64)> = self
            .state
            .product_ids
            .iter()
            .zip(&self.state.similarity[row])
            .filter(|&(&id, _)| id != product_id)
            .map(|(&id, &score)| (id, score))
            .collect();
        scored.sort_by(by_score_then_id);

        scored
            .into_iter()
            .take(n)
            .filter_map(|(id, score)| {
                self.product(id).map(|p| SimilarProduct {
                    product: p.clone(),
                    similarity_score: score,
                })
            })
            .collect()
    }

    /// Personalized recommendations for `user_id`.
    ///
    /// Users without ratings get the first `n` catalog products.
    pub fn recommend_for_user(&self, user_id: i64, n: usize) -> Vec<Recommendation> {
        let Ok(row) = self.state.user_ids.binary_search(&user_id) else {
            return self
                .state
                .products
                .iter()
                .take(n)
                .cloned()
                .map(Recommendation::plain)
                .collect();
        };

        let rated = &self.state.ratings[row];
        let mut predicted: Vec<(i64, f64)> = Vec::new();
        for (col, &candidate_id) in self.state.product_ids.iter().enumerate() {
            if rated.binary_search_by_key(&col, |&(c, _)| c).is_ok() {
                continue;
            }
            let sims = &self.state.similarity[col];
            let (weighted, total) = rated
                .iter()
                .fold((0.0, 0.0), |(weighted, total), &(other, rating)| {
                    let w = sims[other];
                    (weighted + w * rating, total + w.abs())
                });
            if total > 0.0 {
                predicted.push((candidate_id, weighted / total));
            }
        }
        predicted.sort_by(by_score_then_id);

        predicted
            .into_iter()
            .take(n)
            .filter_map(|(id, rating)| {
                self.product(id)
                    .map(|p| Recommendation::predicted(p.clone(), rating))
            })
            .collect()
    }

    /// Most efficient products in `category`, catalog order breaking ties
    pub fn recommend_by_category(&self, category: &str, n: usize) -> Vec<Recommendation> {
        let mut matches: Vec<&Product> = self
            .state
            .products
            .iter()
            .filter(|p| p.category == category)
            .collect();
        matches.sort_by(|a, b| b.efficiency.total_cmp(&a.efficiency));
        matches
            .into_iter()
            .take(n)
            .cloned()
            .map(Recommendation::plain)
            .collect()
    }
}

/// Dense item-item cosine similarity from sparse user rows
fn cosine_similarity(rows: &[Vec<(usize, f64)>], n_items: usize) -> Vec<Vec<f64>> {
    let mut dots = vec![vec![0.0; n_items]; n_items];
    for row in rows {
        for &(a, ra) in row {
            for &(b, rb) in row {
                dots[a][b] += ra * rb;
            }
        }
    }

    let norms: Vec<f64> = (0..n_items).map(|i| dots[i][i].sqrt()).collect();
    let mut similarity = vec![vec![0.0; n_items]; n_items];
    for i in 0..n_items {
        for j in 0..n_items {
            similarity[i][j] = if i == j {
                1.0
            } else if norms[i] > 0.0 && norms[j] > 0.0 {
                (dots[i][j] / (norms[i] * norms[j])).clamp(-1.0, 1.0)
            } else {
                0.0
            };
        }
    }
    similarity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::sample_data::{sample_interactions, sample_products};
    use assert_matches::assert_matches;

    fn sample_model() -> TrainedRecommender {
        TrainedRecommender::fit(&sample_interactions(), sample_products()).unwrap()
    }

    #[test]
    fn similar_products_for_sample_excludes_query() {
        let model = sample_model();
        let similar = model.similar_products(1, 3);

        assert_eq!(similar.len(), 3);
        assert!(similar.iter().all(|s| s.product.id != 1));
        let ids: HashSet<i64> = similar.iter().map(|s| s.product.id).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| (2..=10).contains(id)));
        assert!(similar
            .windows(2)
            .all(|w| w[0].similarity_score >= w[1].similarity_score));
    }

    #[test]
    fn sample_similarity_values() {
        let model = sample_model();
        // product 1 rated by users 1 (5) and 3 (4); product 10 by users 3 (5) and 5 (4)
        let expected = 20.0 / (41.0_f64.sqrt() * 41.0_f64.sqrt());
        assert!((model.similarity(1, 10).unwrap() - expected).abs() < 1e-12);
        // no user rated both 1 and 4
        assert_eq!(model.similarity(1, 4), Some(0.0));
        assert_eq!(model.similarity(7, 7), Some(1.0));
    }

    #[test]
    fn similar_products_ties_break_by_id() {
        let model = sample_model();
        let similar = model.similar_products(1, 9);
        for pair in similar.windows(2) {
            if pair[0].similarity_score == pair[1].similarity_score {
                assert!(pair[0].product.id < pair[1].product.id);
            }
        }
    }

    #[test]
    fn unknown_product_has_no_similar_items() {
        assert!(sample_model().similar_products(999, 5).is_empty());
    }

    #[test]
    fn cold_start_returns_catalog_head() {
        let model = sample_model();
        let recs = model.recommend_for_user(42, 3);
        let ids: Vec<i64> = recs.iter().map(|r| r.product.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(recs.iter().all(|r| r.predicted_rating.is_none()));
    }

    #[test]
    fn known_user_gets_unrated_products_with_predictions() {
        let model = sample_model();
        let recs = model.recommend_for_user(1, 10);
        assert!(!recs.is_empty());
        for rec in &recs {
            assert!(![1, 3, 5].contains(&rec.product.id));
            let rating = rec.predicted_rating.unwrap();
            assert!(rating > 0.0 && rating <= 5.0);
        }
        assert!(recs
            .windows(2)
            .all(|w| w[0].predicted_rating >= w[1].predicted_rating));
    }

    #[test]
    fn predictions_are_similarity_weighted_averages_of_the_users_ratings() {
        // user 1 rated 1 (5), 3 (4) and 5 (5)
        let recs = sample_model().recommend_for_user(1, 10);
        let scored: Vec<(i64, f64)> = recs
            .iter()
            .map(|r| (r.product.id, r.predicted_rating.unwrap()))
            .collect();
        assert_eq!(scored.len(), 5);

        // 2 and 10 only overlap with products rated 5; 7 only with 5
        let mut top: Vec<i64> = scored[..3].iter().map(|&(id, _)| id).collect();
        top.sort_unstable();
        assert_eq!(top, vec![2, 7, 10]);
        assert!(scored[..3].iter().all(|&(_, r)| (r - 5.0).abs() < 1e-9));

        // 6 and 9 only overlap with product 3, rated 4
        let mut rest: Vec<i64> = scored[3..].iter().map(|&(id, _)| id).collect();
        rest.sort_unstable();
        assert_eq!(rest, vec![6, 9]);
        assert!(scored[3..].iter().all(|&(_, r)| (r - 4.0).abs() < 1e-9));

        // 4 and 8 have zero similarity to everything user 1 rated
        assert!(scored.iter().all(|&(id, _)| id != 4 && id != 8));
    }

    #[test]
    fn zero_rating_counts_as_rated() {
        let products = sample_products();
        let interactions = vec![
            Interaction::new(1, 1, 0.0),
            Interaction::new(1, 2, 4.0),
            Interaction::new(2, 1, 5.0),
            Interaction::new(2, 3, 3.0),
        ];
        let model = TrainedRecommender::fit(&interactions, products).unwrap();
        let recs = model.recommend_for_user(1, 10);
        assert!(recs.iter().all(|r| r.product.id != 1 && r.product.id != 2));
    }

    #[test]
    fn repeated_rating_keeps_the_last_one() {
        let interactions = vec![
            Interaction::new(1, 1, 1.0),
            Interaction::new(1, 1, 5.0),
            Interaction::new(2, 1, 5.0),
            Interaction::new(2, 2, 5.0),
        ];
        let model = TrainedRecommender::fit(&interactions, sample_products()).unwrap();
        // columns (5, 5) and (0, 5) after dedup
        let expected = 25.0 / (50.0_f64.sqrt() * 5.0);
        assert!((model.similarity(1, 2).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn category_is_sorted_by_efficiency() {
        let model = sample_model();
        let recs = model.recommend_by_category("solar", 10);
        let ids: Vec<i64> = recs.iter().map(|r| r.product.id).collect();
        assert_eq!(ids, vec![10, 4, 6, 1]);
        assert!(model.recommend_by_category("nuclear", 5).is_empty());
        assert_eq!(model.recommend_by_category("solar", 2).len(), 2);
    }

    #[test]
    fn empty_interactions_build_an_empty_model() {
        let model = TrainedRecommender::fit(&[], sample_products()).unwrap();
        assert_eq!(model.user_count(), 0);
        assert!(model.similar_products(1, 5).is_empty());
        assert_eq!(model.recommend_for_user(1, 2).len(), 2);
        assert_eq!(model.products().len(), 10);
    }

    #[test]
    fn unknown_product_in_interactions_is_rejected() {
        let interactions = vec![Interaction::new(1, 77, 3.0)];
        assert_matches!(
            TrainedRecommender::fit(&interactions, sample_products()),
            Err(ModelError::InvalidInput(msg)) if msg.contains("77")
        );
        assert_matches!(
            TrainedRecommender::fit(&interactions, Vec::new()),
            Err(ModelError::InvalidInput(_))
        );
    }

    #[test]
    fn invalid_ratings_and_catalog_are_rejected() {
        let negative = vec![Interaction::new(1, 1, -1.0)];
        assert!(TrainedRecommender::fit(&negative, sample_products()).is_err());

        let nan = vec![Interaction::new(1, 1, f64::NAN)];
        assert!(TrainedRecommender::fit(&nan, sample_products()).is_err());

        let mut duplicated = sample_products();
        duplicated.push(duplicated[0].clone());
        assert!(TrainedRecommender::fit(&[], duplicated).is_err());

        let mut bad_efficiency = sample_products();
        bad_efficiency[0].efficiency = 1.5;
        assert!(TrainedRecommender::fit(&[], bad_efficiency).is_err());
    }

    #[test]
    fn serde_round_trip_rebuilds_catalog_index() {
        let model = sample_model();
        let json = serde_json::to_string(&model).unwrap();
        let restored: TrainedRecommender = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.product(4).map(|p| p.name.as_str()), Some("Solar Inverter 3kW"));
        assert_eq!(
            restored
                .similar_products(1, 3)
                .iter()
                .map(|s| s.product.id)
                .collect::<Vec<_>>(),
            model
                .similar_products(1, 3)
                .iter()
                .map(|s| s.product.id)
                .collect::<Vec<_>>()
        );
    }
}
