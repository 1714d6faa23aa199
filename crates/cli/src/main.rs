use clap::{ArgAction, Parser, Subcommand};
use deployer_core::{
    Bytes, TxHash, VerifyOptions, deploy_factory, error::error_kind, ledger_records, load_config,
    recover_deployment, resolve_network,
    types::deployment::{DEFAULT_FACTORY, DeploymentRequest, DeploymentResult},
    types::verification::VerificationOutcome,
    utils::address_or_contract_name::AddressOrContractName,
    verify_contract,
};
use eyre::Result;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the config file
    #[arg(long = "config", short = 'c', global = true)]
    config: Option<String>,

    /// Network name as declared under [networks] in the config
    #[arg(long = "network", short = 'n', env = "NETWORK", global = true)]
    network: Option<String>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a new factory instance. Every run creates a new contract.
    Deploy {
        /// Factory contract name
        #[arg(long = "factory", short = 'f', env = "FACTORY", default_value = DEFAULT_FACTORY)]
        factory: String,

        /// Constructor argument, in ABI order (repeatable)
        #[arg(long = "arg", short = 'a')]
        args: Vec<String>,

        /// Deploy even if an earlier deployment of this factory is still pending
        #[arg(long = "allow-pending")]
        allow_pending: bool,
    },
    /// Wait for a previously submitted deployment instead of redeploying
    Recover {
        /// Deployment transaction hash
        #[arg(long = "tx", short = 't')]
        tx_hash: TxHash,

        /// Factory to record the deployment under when the ledger does not know it
        #[arg(long = "factory", short = 'f', env = "FACTORY", default_value = DEFAULT_FACTORY)]
        factory: String,
    },
    /// Verify a deployed contract's source on the network's explorer
    Verify {
        /// Contract address, or a factory name resolved through the ledger
        #[arg(long = "address", env = "VERIFY_ADDRESS", value_parser = parse_target)]
        target: AddressOrContractName,

        /// Artifact to verify against, when it differs from the recorded one
        #[arg(long = "factory", short = 'f')]
        factory: Option<String>,

        /// ABI-encoded constructor arguments (hex)
        #[arg(long = "constructor-args")]
        constructor_args: Option<Bytes>,

        /// Full solc version, e.g. v0.8.17+commit.8df45f5f
        #[arg(long = "compiler-version")]
        compiler_version: Option<String>,

        /// Do not check that the address holds code before submitting
        #[arg(long = "skip-code-check")]
        skip_code_check: bool,
    },
    /// Print the deployment ledger of a network
    Ledger,
}

fn parse_target(s: &str) -> Result<AddressOrContractName, String> {
    s.parse().map_err(|e: eyre::Report| e.to_string())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    // RUST_LOG wins over -v
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_deployment(result: &DeploymentResult) -> Result<()> {
    println!("{} deployed at: {}", result.factory, result.address);
    println!("Transaction Hash: {}", result.tx_hash);
    println!("Block Number: {}", result.block_number);
    if !result.constructor_args.is_empty() {
        println!("Constructor Args: {}", result.constructor_args);
    }
    if let Some(url) = result.network.explorer_address_url(&result.address.to_string()) {
        println!("Explorer URL: {}", url);
    }
    println!("Network Config:");
    println!("{}", serde_json::to_string_pretty(&result.network.redacted())?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let network = resolve_network(&config, cli.network.as_deref())?;

    match cli.command {
        Commands::Deploy {
            factory,
            args,
            allow_pending,
        } => {
            let request = DeploymentRequest::new(factory)
                .with_constructor_args(args)
                .allow_pending(allow_pending);
            let result = deploy_factory(&config, &network, &request).await?;
            print_deployment(&result)?;
        }
        Commands::Recover { tx_hash, factory } => {
            let result = recover_deployment(&config, &network, tx_hash, &factory).await?;
            print_deployment(&result)?;
        }
        Commands::Verify {
            target,
            factory,
            constructor_args,
            compiler_version,
            skip_code_check,
        } => {
            let options = VerifyOptions {
                factory,
                constructor_args,
                compiler_version,
                skip_code_check,
            };
            let summary = verify_contract(&config, &network, &target, &options).await?;
            match summary.outcome {
                VerificationOutcome::Verified => {
                    println!("Verified {} at {}", summary.contract, summary.address)
                }
                VerificationOutcome::AlreadyVerified => {
                    println!("{} at {} was already verified", summary.contract, summary.address)
                }
            }
            if let Some(url) = summary.explorer_url {
                println!("Explorer URL: {}", url);
            }
        }
        Commands::Ledger => {
            let records = ledger_records(&config, &network)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }
    Ok(())
}

/// Exit status and stderr line for a finished run. Failures name their
/// taxonomy kind when the chain carries one.
fn report(result: Result<()>) -> (u8, Option<String>) {
    match result {
        Ok(()) => (0, None),
        Err(e) => {
            let message = match error_kind(&e) {
                Some(kind) => format!("error[{}]: {:#}", kind, e),
                None => format!("error: {:#}", e),
            };
            (1, Some(message))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    let (code, message) = report(run(cli).await);
    if let Some(message) = message {
        eprintln!("{}", message);
    }
    ExitCode::from(code)
}
