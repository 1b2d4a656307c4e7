use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;

use shop_router::application::errors::RouterError;
use shop_router::application::messaging::MessageDispatcher;
use shop_router::application::services::ConsumerService;
use shop_router::domain::entities::{Currency, OrderDraft};
use shop_router::domain::traits::{Broker, Store};
use shop_router::infrastructure::broker::AmqpBroker;
use shop_router::infrastructure::config::{Config, ConsumerGroup};
use shop_router::infrastructure::database::Database;

#[derive(Parser)]
#[command(name = "shop-router")]
#[command(about = "Routes chat-bot requests from the broker to the shop store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume one producer group's inbound queue until interrupted
    Run {
        #[arg(short, long, value_enum)]
        group: ConsumerGroup,
    },
    /// Publish a raw JSON body to a queue
    Send {
        #[arg(short, long)]
        queue: String,
        /// JSON payload, sent as a single message body
        json: String,
    },
    /// Open an order with its payment for a chat
    SeedOrder {
        #[arg(long)]
        username: String,
        #[arg(long)]
        chat_id: String,
        #[arg(long, default_value = "EUR")]
        currency: Currency,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { group } => block_on(run_consumer(load_config(&cli.config), group)),
        Commands::Send { queue, json } => block_on(send(load_config(&cli.config), queue, json)),
        Commands::SeedOrder {
            username,
            chat_id,
            currency,
            amount,
            name,
            description,
        } => {
            let mut draft = OrderDraft::new(currency, amount).with_sender_service("shop-router");
            if let Some(name) = name {
                draft = draft.with_name(name);
            }
            if let Some(description) = description {
                draft = draft.with_description(description);
            }
            block_on(seed_order(load_config(&cli.config), username, chat_id, draft))
        }
        Commands::Version => {
            println!("shop-router v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(config_path: &str) -> Config {
    let mut config = if Path::new(config_path).exists() {
        Config::load(config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        Config::default()
    };
    config.apply_env();
    config
}

fn block_on<F>(future: F) -> Result<(), RouterError>
where
    F: std::future::Future<Output = Result<(), RouterError>>,
{
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| RouterError::Internal(format!("Failed to start runtime: {}", e)))?;
    rt.block_on(future)
}

async fn run_consumer(config: Config, group: ConsumerGroup) -> Result<(), RouterError> {
    config.validate()?;
    tracing::info!("Starting shop-router ({} group)", group);

    let store: Arc<dyn Store> = Arc::new(Database::new(&config.database.path)?);
    tracing::info!("Database ready at {}", config.database.path.display());

    let broker = AmqpBroker::connect(&config.broker).await?;
    let dispatcher = MessageDispatcher::new(store);
    let mut consumer = ConsumerService::new(broker, dispatcher, config.routes(group));

    consumer.start().await?;
    let stats = consumer.run_until(shutdown_signal()).await?;

    tracing::info!(
        "shop-router stopped after {} replies and {} rejected deliveries",
        stats.replied,
        stats.rejected
    );
    Ok(())
}

async fn send(config: Config, queue: String, json: String) -> Result<(), RouterError> {
    let payload: serde_json::Value = serde_json::from_str(&json)?;

    let mut broker = AmqpBroker::connect(&config.broker).await?;
    broker.declare_queue(&queue).await?;
    broker.publish_json(&queue, &payload).await?;
    broker.close().await?;

    tracing::info!("Published to '{}'", queue);
    Ok(())
}

async fn seed_order(
    config: Config,
    username: String,
    chat_id: String,
    draft: OrderDraft,
) -> Result<(), RouterError> {
    let db = Database::new(&config.database.path)?;

    let (user, _) = db.get_or_create_user(&username).await?;
    db.get_or_create_profile(&chat_id, &user).await?;
    if let Some(open) = db.find_open_order(&chat_id).await? {
        return Err(RouterError::Internal(format!(
            "chat {} already has open order {}",
            chat_id, open.id
        )));
    }

    let (order, payment) = db.create_order(&user, &draft).await?;
    println!(
        "Order {} for {} ({} {})",
        order.id, user, payment.amount, payment.currency
    );
    Ok(())
}

fn init_config() -> Result<(), RouterError> {
    let config = Config::default();
    let yaml = serde_yaml::to_string(&config)
        .map_err(|e| RouterError::Internal(format!("Failed to render config: {}", e)))?;
    println!("{}", yaml);
    println!("\nSave this to config.yaml and adjust as needed.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Unable to install ctrl+c handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Unable to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
