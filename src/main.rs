use chain_core::{Chain, Mempool, Transaction, TxInput, TxOutput, RuleTag};
use clap::{Args, Parser, Subcommand};
use contrast_node::{NodeConfig, NodeCore, NodeState};
use shared::{derive_address, Address, Ed25519Signer, Signer};
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "contrast-node")]
#[command(about = "UTXO blockchain node core: mempool, UTXO accounting, block candidates, validation")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk through genesis, a mined block, and a simple transfer end to end
    Demo,
    /// Print the resolved node configuration
    Config(ConfigArgs),
    /// Print version information
    Version,
}

#[derive(Args)]
struct ConfigArgs {
    /// Optional TOML config file to overlay onto the defaults
    #[arg(long)]
    file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> shared::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Demo) | None => run_demo(),
        Some(Commands::Config(args)) => show_config(&args),
        Some(Commands::Version) => {
            show_version();
            Ok(())
        }
    }
}

fn init_logging(log_level: &str) {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn show_config(args: &ConfigArgs) -> shared::Result<()> {
    init_logging(&args.log_level);
    let config = match &args.file {
        Some(path) => NodeConfig::from_toml_file(path)?,
        None => NodeConfig::default(),
    };
    info!(
        target_block_time_ms = config.target_block_time_ms,
        max_block_size = config.max_block_size,
        halving_interval = config.halving_interval,
        "resolved node configuration"
    );
    println!("{}", serde_json::to_string_pretty(&config).expect("config serializes"));
    Ok(())
}

fn show_version() {
    println!("contrast-node 0.1.0");
}

/// Builds a genesis chain, mines the genesis candidate at trivial
/// difficulty, admits a transfer from the coinbase recipient, mines a
/// second block, and prints the resulting balances.
fn run_demo() -> shared::Result<()> {
    init_logging("info");
    info!("starting node core demo");

    let validator = derive_address(&Ed25519Signer::generate().public_key())?;
    let coinbase_signer = Ed25519Signer::generate();
    let coinbase_recipient = derive_address(&coinbase_signer.public_key())?;

    let chain = Chain::genesis(Default::default(), validator.clone(), coinbase_recipient.clone(), 0)
        .map_err(|e| shared::ChainError::SerializationError(e.to_string()))?;
    let mempool = Mempool::new(5_000);
    let core = NodeCore::spawn(NodeState::new(chain, mempool));

    info!(
        validator_balance = 0,
        coinbase_balance = chain_core::block::GENESIS_REWARD,
        "genesis applied"
    );

    let recipient = derive_address(&Ed25519Signer::generate().public_key())?;
    let coinbase_id = core.submit_job(|state| state.chain.tip().coinbase_tx().unwrap().id);
    let anchor = chain_core::Anchor::new(0, coinbase_id, 0);

    let mut spend = Transaction {
        id: shared::TxId::from_bytes([0; 4]),
        version: 1,
        inputs: vec![TxInput::Anchor(anchor)],
        outputs: vec![TxOutput::Standard {
            amount: 30_000_000,
            rule: RuleTag::Sig,
            address: recipient.clone(),
        }],
        witnesses: vec![],
    };
    spend.id = spend.compute_id();
    let pre_image = spend.canonical_body_bytes();
    let signature = coinbase_signer.sign(&pre_image);
    spend.witnesses.push(chain_core::Witness {
        signature,
        public_key: coinbase_signer.public_key(),
    });

    core.admit_transaction(spend, None)
        .map_err(|e| shared::ChainError::SerializationError(e.to_string()))?;
    info!("transfer admitted to mempool");

    let target_block_time_ms = core.submit_job(|state| state.chain.params().target_block_time_ms);
    let mut candidate = core.build_candidate(validator.clone(), coinbase_recipient.clone(), vec![2], 10_000);
    // Simulate the miner taking exactly the target interval, so
    // `timeDiffAdjustment` contributes nothing and the declared difficulty
    // alone governs the proof-of-work search.
    candidate.timestamp = candidate.pos_timestamp + target_block_time_ms;
    let final_difficulty = candidate.final_difficulty(target_block_time_ms);
    let sealed = chain_core::block::seal_with_proof_of_work(
        candidate,
        final_difficulty,
        1,
        &std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
    )
    .map_err(|e| shared::ChainError::SerializationError(e.to_string()))?;

    core.apply_mined_block(sealed)
        .map_err(|e| shared::ChainError::SerializationError(e.to_string()))?;

    let recipient_balance = core.submit_job({
        let recipient = recipient.clone();
        move |state| state.chain.utxo_index().balance_of(&recipient)
    });
    info!(%recipient_balance, "second block applied");
    println!("recipient balance after transfer: {recipient_balance}");

    Ok(())
}
