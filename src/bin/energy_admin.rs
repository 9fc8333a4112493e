use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::debug;

use renewable_energy_api::{
    config::{self, AppConfig},
    models::{Interaction, Observation, Product, Recommendation},
    services::{ForecastService, PlotKind, RecommendationService},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize(cli.model_dir)?;

    match cli.command {
        Commands::TrainForecaster(args) => handle_train_forecaster(&context, args, cli.json).await?,
        Commands::TrainRecommender(args) => {
            handle_train_recommender(&context, args, cli.json).await?
        }
        Commands::Forecast(args) => handle_forecast(&context, args, cli.json).await?,
        Commands::Metrics => handle_metrics(&context, cli.json).await?,
        Commands::Similar(args) => handle_similar(&context, args, cli.json).await?,
        Commands::RecommendUser(args) => handle_recommend_user(&context, args, cli.json).await?,
        Commands::RecommendCategory(args) => {
            handle_recommend_category(&context, args, cli.json).await?
        }
        Commands::Plot(args) => handle_plot(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Debug, Parser)]
#[command(
    name = "energy-admin",
    about = "Train and query the renewable energy models on disk",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[arg(
        long,
        global = true,
        help = "Model snapshot directory (defaults to the configured model_dir)"
    )]
    model_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Train the demand forecaster and save its snapshot
    TrainForecaster(TrainForecasterArgs),
    /// Train the product recommender and save its snapshot
    TrainRecommender(TrainRecommenderArgs),
    /// Print an hourly forecast
    Forecast(ForecastArgs),
    /// Print the forecaster's fit metrics
    Metrics,
    /// Products most similar to a product
    Similar(SimilarArgs),
    /// Recommendations for a user
    RecommendUser(RecommendUserArgs),
    /// Most efficient products in a category
    RecommendCategory(RecommendCategoryArgs),
    /// Render a forecast chart to a PNG file
    Plot(PlotArgs),
}

#[derive(Debug, Args)]
struct TrainForecasterArgs {
    /// JSON array of {"ds", "y"} observations; sample demand is used when omitted
    #[arg(long)]
    input: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TrainRecommenderArgs {
    /// JSON array of {"user_id", "product_id", "rating"}
    #[arg(long, requires = "products")]
    interactions: Option<PathBuf>,
    /// JSON array of products
    #[arg(long, requires = "interactions")]
    products: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ForecastArgs {
    #[arg(long)]
    periods: Option<usize>,
}

#[derive(Debug, Args)]
struct SimilarArgs {
    #[arg(long)]
    product_id: i64,
    #[arg(long)]
    count: Option<usize>,
}

#[derive(Debug, Args)]
struct RecommendUserArgs {
    #[arg(long)]
    user_id: i64,
    #[arg(long)]
    count: Option<usize>,
}

#[derive(Debug, Args)]
struct RecommendCategoryArgs {
    #[arg(long)]
    category: String,
    #[arg(long)]
    count: Option<usize>,
}

#[derive(Debug, Args)]
struct PlotArgs {
    #[arg(long)]
    periods: Option<usize>,
    /// Output PNG path
    #[arg(long)]
    out: PathBuf,
    /// Plot trend and seasonal components instead of the forecast
    #[arg(long, action = ArgAction::SetTrue)]
    components: bool,
    /// Leave the recent training history off the forecast plot
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "components")]
    no_history: bool,
}

struct CliContext {
    forecast: ForecastService,
    recommender: RecommendationService,
}

impl CliContext {
    fn initialize(model_dir: Option<PathBuf>) -> Result<Self> {
        let mut config: AppConfig =
            config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);
        if let Some(dir) = model_dir {
            config.model_dir = dir;
        }
        debug!(model_dir = %config.model_dir.display(), "Using model directory");

        Ok(Self {
            forecast: ForecastService::new(&config.model_dir, config.forecast.clone()),
            recommender: RecommendationService::new(
                &config.model_dir,
                config.recommender.clone(),
            ),
        })
    }

    async fn loaded_forecast(&self) -> Result<&ForecastService> {
        self.forecast
            .load_from_disk()
            .await
            .context("failed to load forecaster snapshot")?;
        Ok(&self.forecast)
    }

    async fn loaded_recommender(&self) -> Result<&RecommendationService> {
        self.recommender
            .load_from_disk()
            .await
            .context("failed to load recommender snapshot")?;
        Ok(&self.recommender)
    }
}

async fn handle_train_forecaster(
    context: &CliContext,
    args: TrainForecasterArgs,
    json: bool,
) -> Result<()> {
    let series = args
        .input
        .as_deref()
        .map(read_json::<Vec<Observation>>)
        .transpose()?;

    let summary = context
        .forecast
        .train(series)
        .await
        .context("forecaster training failed")?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Forecaster trained on {} points{} • MAE {:.3} • RMSE {:.3}",
            summary.points,
            if summary.used_sample_data { " (sample data)" } else { "" },
            summary.metrics.mae,
            summary.metrics.rmse
        );
    }
    Ok(())
}

async fn handle_train_recommender(
    context: &CliContext,
    args: TrainRecommenderArgs,
    json: bool,
) -> Result<()> {
    let interactions = args
        .interactions
        .as_deref()
        .map(read_json::<Vec<Interaction>>)
        .transpose()?;
    let products = args
        .products
        .as_deref()
        .map(read_json::<Vec<Product>>)
        .transpose()?;

    let summary = context
        .recommender
        .train(interactions, products)
        .await
        .context("recommender training failed")?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Recommender trained • {} users • {} rated products • catalog of {}{}",
            summary.users,
            summary.rated_products,
            summary.products,
            if summary.used_sample_data { " (sample data)" } else { "" }
        );
    }
    Ok(())
}

async fn handle_forecast(context: &CliContext, args: ForecastArgs, json: bool) -> Result<()> {
    let forecast = context.loaded_forecast().await?.forecast(args.periods).await?;

    if json {
        print_json(&json!({ "periods": forecast.len(), "forecast": forecast }))?;
    } else {
        for point in &forecast {
            println!(
                "- {} • {:.2} [{:.2}, {:.2}]",
                point.ds.to_rfc3339(),
                point.yhat,
                point.yhat_lower,
                point.yhat_upper
            );
        }
    }
    Ok(())
}

async fn handle_metrics(context: &CliContext, json: bool) -> Result<()> {
    let metrics = context.loaded_forecast().await?.metrics().await?;
    if json {
        print_json(&metrics)?;
    } else {
        println!("MAE {:.4} • RMSE {:.4}", metrics.mae, metrics.rmse);
    }
    Ok(())
}

async fn handle_similar(context: &CliContext, args: SimilarArgs, json: bool) -> Result<()> {
    let similar = context
        .loaded_recommender()
        .await?
        .similar(args.product_id, args.count)
        .await?;

    if json {
        print_json(&similar)?;
    } else if similar.is_empty() {
        println!("No similar products for {}", args.product_id);
    } else {
        for item in &similar {
            println!(
                "- Product {} • {} • similarity {:.3}",
                item.product.id, item.product.name, item.similarity_score
            );
        }
    }
    Ok(())
}

async fn handle_recommend_user(
    context: &CliContext,
    args: RecommendUserArgs,
    json: bool,
) -> Result<()> {
    let recommendations = context
        .loaded_recommender()
        .await?
        .recommend_for_user(args.user_id, args.count)
        .await?;
    render_recommendations(&recommendations, json)
}

async fn handle_recommend_category(
    context: &CliContext,
    args: RecommendCategoryArgs,
    json: bool,
) -> Result<()> {
    let recommendations = context
        .loaded_recommender()
        .await?
        .recommend_by_category(&args.category, args.count)
        .await?;
    render_recommendations(&recommendations, json)
}

async fn handle_plot(context: &CliContext, args: PlotArgs, json: bool) -> Result<()> {
    let kind = if args.components {
        PlotKind::Components
    } else {
        PlotKind::Forecast {
            include_history: !args.no_history,
        }
    };

    let bytes = context
        .loaded_forecast()
        .await?
        .write_plot(&args.out, args.periods, kind)
        .await
        .with_context(|| format!("failed to write plot to {}", args.out.display()))?;

    if json {
        print_json(&json!({ "path": args.out, "bytes": bytes }))?;
    } else {
        println!("Plot written to {} ({} bytes)", args.out.display(), bytes);
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_recommendations(recommendations: &[Recommendation], json: bool) -> Result<()> {
    if json {
        return print_json(&recommendations);
    }
    if recommendations.is_empty() {
        println!("No recommendations");
    }
    for item in recommendations {
        match item.predicted_rating {
            Some(rating) => println!(
                "- Product {} • {} • predicted rating {:.2}",
                item.product.id, item.product.name, rating
            ),
            None => println!(
                "- Product {} • {} • {} • efficiency {:.2}",
                item.product.id, item.product.name, item.product.category, item.product.efficiency
            ),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{error::ErrorKind, CommandFactory};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("energy-admin").chain(args.iter().copied()))
            .unwrap()
    }

    fn parse_err(args: &[&str]) -> ErrorKind {
        Cli::try_parse_from(std::iter::once("energy-admin").chain(args.iter().copied()))
            .unwrap_err()
            .kind()
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn train_forecaster_takes_an_optional_input_file() {
        let cli = parse(&["train-forecaster"]);
        assert!(!cli.json);
        assert!(cli.model_dir.is_none());
        match cli.command {
            Commands::TrainForecaster(args) => assert!(args.input.is_none()),
            other => panic!("unexpected command {:?}", other),
        }

        let cli = parse(&["train-forecaster", "--input", "demand.json"]);
        match cli.command {
            Commands::TrainForecaster(args) => {
                assert_eq!(args.input, Some(PathBuf::from("demand.json")))
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn train_recommender_needs_both_tables_or_neither() {
        match parse(&["train-recommender"]).command {
            Commands::TrainRecommender(args) => {
                assert!(args.interactions.is_none());
                assert!(args.products.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = parse(&[
            "train-recommender",
            "--interactions",
            "ratings.json",
            "--products",
            "catalog.json",
        ]);
        match cli.command {
            Commands::TrainRecommender(args) => {
                assert_eq!(args.interactions, Some(PathBuf::from("ratings.json")));
                assert_eq!(args.products, Some(PathBuf::from("catalog.json")));
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert_eq!(
            parse_err(&["train-recommender", "--interactions", "ratings.json"]),
            ErrorKind::MissingRequiredArgument
        );
        assert_eq!(
            parse_err(&["train-recommender", "--products", "catalog.json"]),
            ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn forecast_and_metrics_accept_global_flags_after_the_subcommand() {
        let cli = parse(&["forecast", "--periods", "48", "--json", "--model-dir", "/tmp/m"]);
        assert!(cli.json);
        assert_eq!(cli.model_dir, Some(PathBuf::from("/tmp/m")));
        match cli.command {
            Commands::Forecast(args) => assert_eq!(args.periods, Some(48)),
            other => panic!("unexpected command {:?}", other),
        }

        let cli = parse(&["--json", "metrics"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Metrics));
    }

    #[test]
    fn negative_forecast_horizon_is_rejected() {
        assert_eq!(
            parse_err(&["forecast", "--periods=-1"]),
            ErrorKind::ValueValidation
        );
        assert_eq!(
            parse_err(&["forecast", "--periods", "many"]),
            ErrorKind::ValueValidation
        );
    }

    #[test]
    fn recommendation_queries_parse_ids_and_counts() {
        match parse(&["similar", "--product-id", "3", "--count", "4"]).command {
            Commands::Similar(args) => {
                assert_eq!(args.product_id, 3);
                assert_eq!(args.count, Some(4));
            }
            other => panic!("unexpected command {:?}", other),
        }

        match parse(&["recommend-user", "--user-id", "1"]).command {
            Commands::RecommendUser(args) => {
                assert_eq!(args.user_id, 1);
                assert_eq!(args.count, None);
            }
            other => panic!("unexpected command {:?}", other),
        }

        match parse(&["recommend-category", "--category", "solar", "--count", "2"]).command {
            Commands::RecommendCategory(args) => {
                assert_eq!(args.category, "solar");
                assert_eq!(args.count, Some(2));
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert_eq!(parse_err(&["similar"]), ErrorKind::MissingRequiredArgument);
        assert_eq!(
            parse_err(&["recommend-user", "--user-id", "abc"]),
            ErrorKind::ValueValidation
        );
    }

    #[test]
    fn plot_flags() {
        match parse(&["plot", "--out", "chart.png"]).command {
            Commands::Plot(args) => {
                assert_eq!(args.out, PathBuf::from("chart.png"));
                assert_eq!(args.periods, None);
                assert!(!args.components);
                assert!(!args.no_history);
            }
            other => panic!("unexpected command {:?}", other),
        }

        match parse(&["plot", "--out", "parts.png", "--components", "--periods", "72"]).command {
            Commands::Plot(args) => {
                assert!(args.components);
                assert_eq!(args.periods, Some(72));
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert_eq!(
            parse_err(&["plot", "--out", "x.png", "--components", "--no-history"]),
            ErrorKind::ArgumentConflict
        );
        assert_eq!(parse_err(&["plot"]), ErrorKind::MissingRequiredArgument);
    }
}
