use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tinyledger")]
#[command(about = "Minimal UTXO ledger full node and light wallet", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full node using the given config file, until interrupted.
    Node {
        #[arg(long)]
        config: PathBuf,
    },
    /// Initialize a fresh chain store and write its genesis block.
    InitGenesis {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        address: String,
    },
    /// Light-node wallet operations.
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Generate a fresh seed.
    NewSeed,
    /// Print the address derived from a seed.
    Address {
        #[arg(long)]
        seed: String,
    },
    /// Fetch the chain from a full node and print the balance for a seed's address.
    Balance {
        #[arg(long)]
        seed: String,
        #[arg(long)]
        full_node: SocketAddr,
    },
    /// Build, sign, and broadcast a transaction.
    Send {
        #[arg(long)]
        seed: String,
        #[arg(long)]
        full_node: SocketAddr,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Node { config } => run_node(config),
        Commands::InitGenesis { config, address } => init_genesis(config, &address),
        Commands::Wallet { command } => run_wallet(command),
    }
}

fn run_node(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = tinyledger_core::config::Config::from_path(&config_path)?;
    let store = tinyledger_core::store::ChainStore::open(&config.fullnode_info.database_path)?;
    let api = tinyledger_core::api::Api::new(store);

    let reactor_config = tinyledger_network::ReactorConfig {
        client_listen_addr: format!(
            "{}:{}",
            config.fullnode_info.host, config.fullnode_info.clients_listening_port
        )
        .parse()?,
        neighbor_listen_addr: format!(
            "{}:{}",
            config.fullnode_info.host, config.fullnode_info.neighbors_listening_port
        )
        .parse()?,
        neighbor_peer_addr: format!(
            "{}:{}",
            config.neighbors_info.neighbor_address, config.neighbors_info.neighbor_port
        )
        .parse()?,
        formation_threshold: config.formation_threshold,
    };

    let mut reactor = tinyledger_network::FullNodeReactor::bind(api, reactor_config)?;
    tracing::info!(
        clients_port = config.fullnode_info.clients_listening_port,
        neighbors_port = config.fullnode_info.neighbors_listening_port,
        "full node listening"
    );
    reactor.run()?;
    Ok(())
}

fn init_genesis(config_path: PathBuf, address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = tinyledger_core::config::Config::from_path(&config_path)?;
    let store = tinyledger_core::store::ChainStore::init(&config.fullnode_info.database_path)?;
    let api = tinyledger_core::api::Api::new(store);
    api.add_genesis(tinyledger_core::domain::genesis_block(address))?;
    println!("genesis written: 100 units to {address}");
    Ok(())
}

fn run_wallet(command: WalletCommands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        WalletCommands::NewSeed => {
            println!("{}", tinyledger_core::crypto::new_seed());
        }
        WalletCommands::Address { seed } => {
            println!("{}", tinyledger_core::crypto::address(&seed));
        }
        WalletCommands::Balance { seed, full_node } => {
            let wallet = tinyledger_wallet::Wallet::new(seed, full_node);
            let chain = wallet.request_chain()?;
            println!("{}", tinyledger_core::api::balance_of_chain(&chain, wallet.address()));
        }
        WalletCommands::Send { seed, full_node, to, amount } => {
            let mut wallet = tinyledger_wallet::Wallet::new(seed, full_node);
            let chain = wallet.request_chain()?;
            let tx = wallet.create_transaction(&chain, &to, amount)?;
            wallet.broadcast(&tx)?;
            println!("broadcast {}", tx.tx_hash);
        }
    }
    Ok(())
}
