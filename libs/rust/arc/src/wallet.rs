use crate::{
    config::{ArcSettings, Network},
    errors::{ArcError, classify_rpc_error},
    events::hex_address,
    storage::{CURRENT_ADDRESS_KEY, LocalStorage, SELECTED_PROVIDER_KEY},
};
use alloy::{
    network::EthereumWallet,
    primitives::Address,
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English},
};
use std::{str::FromStr, time::Duration};
use tracing::{info, instrument};

/// How the user unlocks their account.
#[derive(Clone)]
pub enum WalletSelection {
    Mnemonic { phrase: String, index: u32 },
    PrivateKey(String),
}

impl std::fmt::Debug for WalletSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.provider_kind())
    }
}

impl WalletSelection {
    /// Value remembered under [`SELECTED_PROVIDER_KEY`].
    pub fn provider_kind(&self) -> &'static str {
        match self {
            WalletSelection::Mnemonic { .. } => "mnemonic",
            WalletSelection::PrivateKey(_) => "private-key",
        }
    }

    pub fn signer(&self) -> Result<PrivateKeySigner, ArcError> {
        match self {
            WalletSelection::Mnemonic { phrase, index } => MnemonicBuilder::<English>::default()
                .phrase(phrase.as_str())
                .index(*index)
                .and_then(|builder| builder.build())
                .map_err(|err| ArcError::InvalidWallet(err.to_string())),
            WalletSelection::PrivateKey(key) => PrivateKeySigner::from_str(key.trim())
                .map_err(|err| ArcError::InvalidWallet(err.to_string())),
        }
    }
}

/// A signer-backed provider whose chain matched the configured network.
#[derive(Clone)]
pub struct EnabledWallet {
    pub address: Address,
    pub chain_id: u64,
    pub provider: DynProvider,
}

impl std::fmt::Debug for EnabledWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnabledWallet")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

/// Connects to `url` over http or ws depending on its scheme.
pub async fn connect_provider(
    url: &str,
    signer: Option<PrivateKeySigner>,
) -> Result<DynProvider, ArcError> {
    let provider = match signer {
        Some(signer) => ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(url)
            .await?
            .erased(),
        None => ProviderBuilder::new().connect(url).await?.erased(),
    };
    Ok(provider)
}

pub fn check_network(expected: Network, chain_id: u64) -> Result<(), ArcError> {
    match Network::from_chain_id(chain_id) {
        Some(actual) if actual == expected => Ok(()),
        actual => Err(ArcError::WrongNetwork {
            expected: expected.to_string(),
            actual: actual
                .map(|network| network.to_string())
                .unwrap_or_else(|| format!("chain {chain_id}")),
        }),
    }
}

/// Unlocks the selected wallet and verifies it talks to the configured network.
#[instrument(skip_all, fields(network = %settings.network, provider = selection.provider_kind()))]
pub async fn unlock_wallet(
    selection: &WalletSelection,
    settings: &ArcSettings,
    timeout: Duration,
) -> Result<EnabledWallet, ArcError> {
    let signer = selection.signer()?;
    let address = signer.address();

    let connect = async {
        let provider = connect_provider(&settings.web3_provider, Some(signer)).await?;
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|err| classify_rpc_error(&err.to_string()))?;
        Ok::<_, ArcError>((provider, chain_id))
    };
    let (provider, chain_id) = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| ArcError::WalletTimeout(timeout))??;

    check_network(settings.network, chain_id)?;
    info!(address = %address, chain_id, "Wallet unlocked");

    Ok(EnabledWallet {
        address,
        chain_id,
        provider,
    })
}

/// [`unlock_wallet`], then remembers the account for the next session.
pub async fn enable_wallet_provider(
    selection: &WalletSelection,
    settings: &ArcSettings,
    storage: &LocalStorage,
    timeout: Duration,
) -> Result<EnabledWallet, ArcError> {
    let wallet = unlock_wallet(selection, settings, timeout).await?;
    storage
        .set(CURRENT_ADDRESS_KEY, &hex_address(&wallet.address))
        .await?;
    storage
        .set(SELECTED_PROVIDER_KEY, selection.provider_kind())
        .await?;
    Ok(wallet)
}

/// Logs out: forgets the remembered account and wallet kind.
pub async fn forget_wallet(storage: &LocalStorage) -> Result<(), ArcError> {
    storage.remove(CURRENT_ADDRESS_KEY).await?;
    storage.remove(SELECTED_PROVIDER_KEY).await
}
