use std::env;
use std::str::FromStr;

use burn::backend::Autodiff;
use burn::config::Config;
use dotenv::dotenv;
use strikebot::TrainError;
use strikebot::rl::dqn::{DqnConfig, DqnTrainer, DuelingQNet, DuelingQNetConfig};
use strikebot::rl::ppo::{PolicyValueNet, PolicyValueNetConfig, PpoConfig, PpoTrainer};
use strikebot::rl::{AgentKind, Environment, RunConfig, SkirmishConfig, SkirmishEnv, train_dqn, train_ppo};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[cfg(feature = "metal")]
type TrainBackend = Autodiff<burn::backend::Metal>;
#[cfg(not(feature = "metal"))]
type TrainBackend = Autodiff<burn::backend::NdArray>;

fn get_env_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.parse::<T>().ok())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strikebot=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

/// Agent hyperparameters from `STRIKEBOT_CONFIG` (JSON), or the defaults
fn load_agent_config<C: Config>(default: C) -> Result<C, TrainError> {
    match env::var("STRIKEBOT_CONFIG") {
        Ok(path) => {
            tracing::info!("Loading agent config from {}", path);
            C::load(&path).map_err(|e| TrainError::Config(format!("{}: {}", path, e)))
        }
        Err(_) => Ok(default),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let agent = match env::var("STRIKEBOT_AGENT") {
        Ok(value) => value.parse::<AgentKind>()?,
        Err(_) => AgentKind::Ppo,
    };
    let seed = get_env_var::<u64>("STRIKEBOT_SEED").unwrap_or(42);

    let mut run_config = RunConfig::new();
    if let Some(episodes) = get_env_var::<usize>("STRIKEBOT_EPISODES") {
        run_config.episodes = episodes;
    }
    if let Some(log_every) = get_env_var::<usize>("STRIKEBOT_LOG_EVERY") {
        run_config.log_every = log_every;
    }

    tracing::info!(
        "Agent: {}, episodes: {}, seed: {}",
        agent,
        run_config.episodes,
        seed
    );

    let mut env = SkirmishEnv::new(SkirmishConfig::new().with_seed(seed))?;
    let shape = env.observation_shape();
    let num_actions = env.action_set().len();
    let device = Default::default();

    let metrics = match agent {
        AgentKind::Ppo => {
            let mut config = load_agent_config(PpoConfig::new())?;
            config.seed = seed;
            let model = PolicyValueNet::<TrainBackend>::new(
                &device,
                shape,
                num_actions,
                &PolicyValueNetConfig::new().with_hidden_size(run_config.hidden_size),
            );
            let mut trainer = PpoTrainer::new(model, shape, num_actions, config, device)?;
            train_ppo(&mut trainer, &mut env, &run_config)?
        }
        AgentKind::Dqn => {
            let mut config = load_agent_config(DqnConfig::new())?;
            config.seed = seed;
            let model = DuelingQNet::<TrainBackend>::new(
                &device,
                shape,
                num_actions,
                &DuelingQNetConfig::new().with_hidden_size(run_config.hidden_size),
            );
            let mut trainer = DqnTrainer::new(model, shape, num_actions, config, device)?;
            train_dqn(&mut trainer, &mut env, &run_config)?
        }
    };

    metrics.log_to_console();
    Ok(())
}
