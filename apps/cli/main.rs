#![warn(unused_extern_crates)]
use alchemy_arc::{LocalStorage, Network, WalletSelection};
use alchemy_store::VoteOutcome;
use alloy::primitives::{Address, I256, U256};
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use std::{path::PathBuf, process::ExitCode, str::FromStr, time::Duration};
use utils::tracing::setup_tracing;

mod commands;

/// Command line front-end for DAOstack DAOs.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[arg(long, env = "arcjs_network", default_value = "ganache", global = true)]
    network: Network,

    /// Replaces `ARC_WEB3PROVIDER`.
    #[arg(long, env = "ETH_PROVIDER", global = true)]
    eth_provider: Option<String>,

    /// File remembering the connected account between runs.
    #[arg(long, env = "ALCHEMY_STORAGE", default_value = ".alchemy/storage.json", global = true)]
    storage: PathBuf,

    #[command(flatten)]
    wallet: WalletArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct WalletArgs {
    #[arg(long, env = "ETH_MNEMONIC", hide_env_values = true, global = true)]
    mnemonic: Option<String>,

    #[arg(long, env = "ETH_ACCOUNT_INDEX", default_value_t = 0, global = true)]
    account_index: u32,

    #[arg(
        long,
        env = "ETH_PRIVATE_KEY",
        hide_env_values = true,
        conflicts_with = "mnemonic",
        global = true
    )]
    private_key: Option<String>,

    /// Seconds to wait for the wallet provider to answer.
    #[arg(long, env = "WALLET_TIMEOUT_SECS", default_value_t = 30, global = true)]
    wallet_timeout_secs: u64,
}

impl WalletArgs {
    fn selection(&self) -> Option<WalletSelection> {
        match (&self.mnemonic, &self.private_key) {
            (Some(phrase), _) => Some(WalletSelection::Mnemonic {
                phrase: phrase.clone(),
                index: self.account_index,
            }),
            (None, Some(key)) => Some(WalletSelection::PrivateKey(key.clone())),
            (None, None) => None,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.wallet_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Choice {
    Yes,
    No,
}

impl From<Choice> for VoteOutcome {
    fn from(choice: Choice) -> Self {
        match choice {
            Choice::Yes => VoteOutcome::Yes,
            Choice::No => VoteOutcome::No,
        }
    }
}

fn parse_u256(value: &str) -> Result<U256, String> {
    U256::from_str(value).map_err(|err| err.to_string())
}

fn parse_i256(value: &str) -> Result<I256, String> {
    I256::from_dec_str(value).map_err(|err| err.to_string())
}

fn parse_address(value: &str) -> Result<Address, String> {
    Address::from_str(value).map_err(|err| err.to_string())
}

#[derive(Debug, Args)]
struct ProposeArgs {
    /// Avatar address of the DAO.
    #[arg(long, value_parser = parse_address)]
    dao: Address,

    /// IPFS hash of the proposal description.
    #[arg(long)]
    description_hash: String,

    #[arg(long, value_parser = parse_address)]
    beneficiary: Address,

    #[arg(long, value_parser = parse_i256, default_value = "0", allow_hyphen_values = true)]
    reputation_change: I256,

    #[arg(long, value_parser = parse_u256, default_value = "0")]
    native_token_reward: U256,

    #[arg(long, value_parser = parse_u256, default_value = "0")]
    eth_reward: U256,

    #[arg(long, value_parser = parse_u256, default_value = "0")]
    external_token_reward: U256,

    #[arg(long, value_parser = parse_address, default_value = "0x0000000000000000000000000000000000000000")]
    external_token: Address,

    #[arg(long, value_parser = parse_u256, default_value = "0")]
    period_length: U256,

    #[arg(long, value_parser = parse_u256, default_value = "1")]
    number_of_periods: U256,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Unlocks the wallet and remembers the account.
    Connect,
    /// Forgets the remembered account.
    Disconnect,
    /// Lists the DAOs indexed by the subgraph.
    Daos,
    Vote {
        proposal_id: String,
        choice: Choice,
    },
    /// Stakes GEN, approving the voting machine first when needed.
    Stake {
        proposal_id: String,
        choice: Choice,
        /// Amount in wei.
        #[arg(value_parser = parse_u256)]
        amount: U256,
    },
    Execute {
        proposal_id: String,
    },
    /// Redeems every reward of a proposal for the beneficiary.
    Redeem {
        proposal_id: String,
        dao: String,
        /// Defaults to the connected account.
        #[arg(long)]
        beneficiary: Option<String>,
    },
    /// Submits a contribution reward proposal.
    Propose(ProposeArgs),
    /// Prints the proposal every time the subgraph reports a change.
    WatchProposal {
        proposal_id: String,
        #[arg(long, default_value_t = 15)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv().ok();
    setup_tracing();

    let cli = Cli::parse();
    let storage = LocalStorage::new(&cli.storage);
    commands::run(cli, storage).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stake_takes_a_choice_and_an_amount() {
        let cli = Cli::try_parse_from([
            "alchemy",
            "--network",
            "rinkeby",
            "stake",
            "0x11",
            "yes",
            "500000000000000000000",
        ])
        .unwrap();

        assert_eq!(cli.network, Network::Rinkeby);
        match cli.command {
            Command::Stake {
                choice, amount, ..
            } => {
                assert_eq!(VoteOutcome::from(choice), VoteOutcome::Yes);
                assert_eq!(amount, U256::from(500u64) * U256::from(10u64).pow(U256::from(18)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn mnemonic_and_private_key_are_exclusive() {
        let result = Cli::try_parse_from([
            "alchemy",
            "--mnemonic",
            "test test test test test test test test test test test junk",
            "--private-key",
            "0x01",
            "connect",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn mnemonic_selects_the_account_index() {
        let cli = Cli::try_parse_from([
            "alchemy",
            "--mnemonic",
            "test test test test test test test test test test test junk",
            "--account-index",
            "2",
            "connect",
        ])
        .unwrap();

        assert!(matches!(
            cli.wallet.selection(),
            Some(WalletSelection::Mnemonic { index: 2, .. })
        ));
    }

    #[test]
    fn propose_accepts_a_reputation_penalty() {
        let cli = Cli::try_parse_from([
            "alchemy",
            "propose",
            "--dao",
            "0x2222222222222222222222222222222222222222",
            "--description-hash",
            "QmHash",
            "--beneficiary",
            "0x3333333333333333333333333333333333333333",
            "--reputation-change",
            "-100",
            "--eth-reward",
            "10",
        ])
        .unwrap();

        let Command::Propose(args) = cli.command else {
            panic!("expected propose");
        };
        assert_eq!(args.reputation_change, I256::from_dec_str("-100").unwrap());
        assert_eq!(args.eth_reward, U256::from(10));
        assert_eq!(args.number_of_periods, U256::from(1));
        assert_eq!(args.external_token, Address::ZERO);
    }

    #[test]
    fn malformed_amounts_are_rejected() {
        let result = Cli::try_parse_from(["alchemy", "stake", "0x11", "no", "lots"]);
        assert!(result.is_err());
    }
}
