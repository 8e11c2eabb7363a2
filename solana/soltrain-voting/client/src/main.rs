//! Command line front end of the voting client.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::keypair::read_keypair_file;
use soltrain_voting_client::pda::{parse_proposal_id, parse_session_id};
use soltrain_voting_client::{
    from_toml_path, spawn_log_stream, ClientConfig, EventKind, Pagination, TransactionResult,
    VotingClient,
};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

const DEFAULT_RPC_URL: &str = "http://localhost:8899";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long)]
    /// TOML file with the client configuration
    config: Option<PathBuf>,

    #[arg(short, long)]
    /// URL for solana RPC, overrides the configuration file
    rpc_url: Option<String>,

    #[arg(short, long)]
    /// Path to the signer key, defaults to ~/.config/solana/id.json
    keypair: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the global session counter
    InitGlobal,
    /// Create a voting session administered by the signer
    CreateSession { name: String, description: String },
    /// Register a voter in a session
    RegisterVoter { session_id: String, voter: Pubkey },
    /// Open proposal registration
    StartProposals { session_id: String },
    /// Close proposal registration
    StopProposals { session_id: String },
    /// Open voting
    StartVoting { session_id: String },
    /// Close voting
    StopVoting { session_id: String },
    /// Register a proposal as the signer
    RegisterProposal {
        session_id: String,
        description: String,
    },
    /// Vote for a proposal as the signer
    Vote {
        session_id: String,
        proposal_id: String,
    },
    /// Tally the votes of a closed session
    Tally { session_id: String },
    /// Print one session
    ShowSession { session_id: String },
    /// List sessions
    ListSessions {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        per_page: Option<u32>,
    },
    /// List the voters of a session
    ListVoters {
        session_id: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        per_page: Option<u32>,
    },
    /// List the proposals of a session
    ListProposals {
        session_id: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        per_page: Option<u32>,
    },
    /// Print program events as they happen
    Watch,
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config: ClientConfig = match &cli.config {
        Some(path) => {
            info!("Reading client config from {path:?}");
            from_toml_path(path).context("Failed to read client configuration")?
        }
        None => ClientConfig::new(DEFAULT_RPC_URL),
    };
    if let Some(rpc_url) = &cli.rpc_url {
        config.rpc_url = rpc_url.clone();
    }
    Ok(config)
}

fn load_keypair(path: Option<&PathBuf>) -> anyhow::Result<Keypair> {
    let path = match path {
        Some(path) => path.clone(),
        None => {
            let home = std::env::var_os("HOME").context("HOME is not set, pass --keypair")?;
            PathBuf::from(home).join(".config/solana/id.json")
        }
    };
    read_keypair_file(&path)
        .map_err(|err| anyhow::anyhow!("Failed to read keypair {path:?}: {err}"))
}

fn print_result(result: &TransactionResult) {
    println!("signature: {}", result.signature);
    for (role, address) in result.accounts.iter() {
        println!("{role}: {address}");
    }
    for event in result.events.iter() {
        println!("event {}: {event:?}", event.kind());
    }
}

fn pagination(
    config: &ClientConfig,
    page: u32,
    per_page: Option<u32>,
) -> anyhow::Result<Pagination> {
    Ok(Pagination::new(page, per_page.unwrap_or(config.default_page_size))?)
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Unable to set global default subscriber")?;

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let client = VotingClient::from_config(&config)?;
    let signer = || load_keypair(cli.keypair.as_ref());

    match &cli.command {
        Command::InitGlobal => print_result(&client.init_global(&signer()?).await?),
        Command::CreateSession { name, description } => {
            let result = client
                .create_voting_session(&signer()?, name, description)
                .await?;
            print_result(&result);
        }
        Command::RegisterVoter { session_id, voter } => {
            let session_id = parse_session_id(session_id)?;
            let result = client.register_voter(&signer()?, session_id, *voter).await?;
            print_result(&result);
        }
        Command::StartProposals { session_id } => {
            let session_id = parse_session_id(session_id)?;
            let result = client
                .start_proposals_registration(&signer()?, session_id)
                .await?;
            print_result(&result);
        }
        Command::StopProposals { session_id } => {
            let session_id = parse_session_id(session_id)?;
            let result = client
                .stop_proposals_registration(&signer()?, session_id)
                .await?;
            print_result(&result);
        }
        Command::StartVoting { session_id } => {
            let session_id = parse_session_id(session_id)?;
            let result = client.start_voting_session(&signer()?, session_id).await?;
            print_result(&result);
        }
        Command::StopVoting { session_id } => {
            let session_id = parse_session_id(session_id)?;
            let result = client.stop_voting_session(&signer()?, session_id).await?;
            print_result(&result);
        }
        Command::RegisterProposal {
            session_id,
            description,
        } => {
            let session_id = parse_session_id(session_id)?;
            let result = client
                .register_proposal(&signer()?, session_id, description)
                .await?;
            print_result(&result);
        }
        Command::Vote {
            session_id,
            proposal_id,
        } => {
            let session_id = parse_session_id(session_id)?;
            let proposal_id = parse_proposal_id(proposal_id)?;
            let result = client.vote(&signer()?, session_id, proposal_id).await?;
            print_result(&result);
        }
        Command::Tally { session_id } => {
            let session_id = parse_session_id(session_id)?;
            let result = client.tally_votes(&signer()?, session_id).await?;
            print_result(&result);
        }
        Command::ShowSession { session_id } => {
            let session = client
                .get_session_by_id(parse_session_id(session_id)?)
                .await?;
            println!("{session:#?}");
        }
        Command::ListSessions { page, per_page } => {
            let pagination = pagination(&config, *page, *per_page)?;
            for session in client.list_sessions(pagination).await? {
                println!(
                    "{} {} [{}] voters={} proposals={}",
                    session.session_id,
                    session.name,
                    session.status,
                    session.voters_count,
                    session.proposals_count
                );
            }
        }
        Command::ListVoters {
            session_id,
            page,
            per_page,
        } => {
            let session_id = parse_session_id(session_id)?;
            let pagination = pagination(&config, *page, *per_page)?;
            for voter in client.list_voters(session_id, pagination).await? {
                println!(
                    "{} {} voted={}",
                    voter.voter_id, voter.voter, voter.has_voted
                );
            }
        }
        Command::ListProposals {
            session_id,
            page,
            per_page,
        } => {
            let session_id = parse_session_id(session_id)?;
            let pagination = pagination(&config, *page, *per_page)?;
            for proposal in client.list_proposals(session_id, pagination).await? {
                println!(
                    "{} {} votes={}",
                    proposal.proposal_id, proposal.description, proposal.vote_count
                );
            }
        }
        Command::Watch => {
            let _subscriptions: Vec<_> = EventKind::ALL
                .into_iter()
                .map(|kind| {
                    client.events().subscribe(kind, move |event| {
                        println!("event {kind}: {event:?}");
                    })
                })
                .collect();
            let ws_url = config.websocket_url()?;
            let stream = spawn_log_stream(
                &ws_url,
                client.program_id(),
                client.send_options().commitment,
                client.events().clone(),
            )
            .await?;
            info!("Watching program events, press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            stream.shutdown().await;
        }
    }

    Ok(())
}
