//! Client for the soltrain voting program.
//!
//! [`VotingClient`] wraps the program's instructions and accounts: it derives account
//! addresses, submits signed transactions, reads emitted events back and lists
//! accounts page by page. Lower layers are public for callers that need them directly.

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod instruction;
pub mod pda;
pub mod retry;
pub mod rpc;
pub mod scanner;
pub mod state;
pub mod status;
pub mod subscription;
pub mod wallet;

pub use client::VotingClient;
pub use config::{from_toml_path, ClientConfig, EventRetryConfig};
pub use error::{ProgramErrorCode, Result, VotingClientError, VotingProgramError};
pub use event::{EventKind, ProgramEvent, TransactionEvents, VotingEvent};
pub use executor::{DerivedAccounts, TransactionExecutor, TransactionResult};
pub use retry::{retry_until_some, RetryPolicy};
pub use rpc::{ChainRpc, SendOptions, TransactionReceipt};
pub use scanner::{AccountScanner, Pagination};
pub use state::{GlobalAccount, ProposalAccount, SessionAccount, VoterAccount, VotingSession};
pub use status::{map_session_status, RawSessionStatus, SessionStatus};
pub use subscription::{spawn_log_stream, EventHub, LogStreamHandle, Subscription};
pub use wallet::WalletSigner;

solana_program::declare_id!("4PGnHfbudx56T214YReyJ25n3UCfLvWG5icWocESzH6n");
