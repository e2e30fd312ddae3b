use std::path::{Path, PathBuf};

use altcoin_consensus::blockdata::block::StoredBlock;
use altcoin_consensus::consensus::{ChainParams, ChainRegistry};
use altcoin_consensus::network::Chain;
use altcoin_consensus::pow::CompactTarget;
use altcoin_consensus::store::MemoryChainStore;
use altcoin_consensus::util::header_from_hex;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Parser)]
#[command(name = "altcoin-consensus")]
#[command(about = "Checks genesis blocks, proof of work and difficulty transitions for Bitcoin-family chains.", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Disable colored output.
    #[arg(long, default_value_t = false, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build every chain's genesis block and check it against the known hash.
    Genesis {
        /// Only check this chain.
        #[arg(short, long)]
        chain: Option<Chain>,
    },
    /// Print a chain's consensus parameters as JSON.
    Params {
        #[arg(short, long)]
        chain: Chain,
    },
    /// Hash an 80-byte header and check it against its declared target.
    Pow {
        #[arg(short, long)]
        chain: Chain,

        /// Hex of the serialized header.
        #[arg(long)]
        header: String,
    },
    /// Verify a run of consecutive headers read from a JSON array of hex strings.
    Verify {
        #[arg(short, long)]
        chain: Chain,

        /// Path of the JSON file.
        #[arg(long)]
        headers: PathBuf,

        /// Height of the first header in the file.
        #[arg(long, default_value_t = 0)]
        start_height: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_tracing(&args)?;

    match args.command {
        Command::Genesis { chain } => genesis(chain),
        Command::Params { chain } => {
            let params = ChainParams::for_chain(chain)?;
            println!("{}", serde_json::to_string_pretty(&params)?);
            Ok(())
        }
        Command::Pow { chain, header } => pow(chain, &header),
        Command::Verify {
            chain,
            headers,
            start_height,
        } => verify(chain, &headers, start_height),
    }
}

fn genesis(chain: Option<Chain>) -> Result<(), Box<dyn std::error::Error>> {
    let registry = match chain {
        Some(chain) => ChainRegistry::with_chains([chain])?,
        None => ChainRegistry::new()?,
    };
    for params in registry.iter() {
        println!(
            "{:<18} {:<26} {}",
            params.chain(),
            params.params().id,
            params.genesis().hash
        );
    }
    Ok(())
}

fn pow(chain: Chain, header: &str) -> Result<(), Box<dyn std::error::Error>> {
    let params = ChainParams::for_chain(chain)?;
    let header = header_from_hex(header)?;
    let digest = params.pow_hash(&header)?;
    let valid = params.has_valid_proof_of_work(&header)?;

    println!("hash  {}", params.block_hash(&header)?);
    println!("pow   {digest}");
    println!("bits  {}", CompactTarget::from(header.bits));
    println!("valid {valid}");
    Ok(())
}

fn verify(
    chain: Chain,
    path: &Path,
    start_height: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = ChainParams::for_chain(chain)?;
    let encoded: Vec<String> = serde_json::from_str(&std::fs::read_to_string(path)?)?;

    let mut headers = encoded.iter().map(|hex| header_from_hex(hex));
    let Some(first) = headers.next() else {
        return Err("no headers to verify".into());
    };
    let first = first?;

    let mut store = MemoryChainStore::new();
    let mut prev = StoredBlock::new(params.block_hash(&first)?, first, start_height);
    store.insert(prev);

    let engine = params.difficulty();
    for header in headers {
        let header = header?;
        let height = prev.height.saturating_add(1);

        if header.prev_blockhash != prev.hash {
            error!(height, expected = %prev.hash, found = %header.prev_blockhash, "Header does not connect");
            return Err(format!("header at height {height} does not connect").into());
        }

        let checked = params
            .verify_proof_of_work(&header)
            .and_then(|_| engine.check_difficulty(&prev, &header, &store));
        if let Err(err) = checked {
            error!(height, %err, "Header rejected");
            return Err(err.into());
        }

        prev = StoredBlock::new(params.block_hash(&header)?, header, height);
        store.insert(prev);
    }

    info!(
        chain = %params.chain(),
        count = store.len(),
        tip = %prev.hash,
        height = prev.height,
        "All headers verified"
    );
    Ok(())
}

fn init_tracing(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let level = match args.log_level.as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => {
            eprintln!(
                "Invalid log level: {}. Using 'info' as default.",
                args.log_level
            );
            tracing::Level::INFO
        }
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr()) && !args.no_color;

    // Output on stdout is reserved for results
    let subscriber = Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_level(true)
            .with_target(true)
            .with_thread_ids(args.verbose)
            .with_thread_names(args.verbose)
            .with_ansi(use_ansi)
            .with_file(args.verbose)
            .with_line_number(args.verbose)
            .with_timer(ChronoUtc::rfc_3339()),
    );

    subscriber.try_init()?;

    Ok(())
}
