use crate::errors::ArcError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Networks the dashboard can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Rinkeby,
    Xdai,
    Ganache,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Rinkeby => "rinkeby",
            Network::Xdai => "xdai",
            Network::Ganache => "ganache",
        }
    }

    pub fn chain_id(self) -> u64 {
        match self {
            Network::Main => 1,
            Network::Rinkeby => 4,
            Network::Xdai => 100,
            Network::Ganache => 1337,
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            1 => Some(Network::Main),
            4 => Some(Network::Rinkeby),
            100 => Some(Network::Xdai),
            1337 => Some(Network::Ganache),
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ArcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" | "mainnet" => Ok(Network::Main),
            "rinkeby" => Ok(Network::Rinkeby),
            "xdai" => Ok(Network::Xdai),
            "ganache" | "private" | "development" => Ok(Network::Ganache),
            other => Err(ArcError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Endpoints for one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcSettings {
    pub network: Network,
    pub graphql_http_provider: String,
    pub graphql_ws_provider: Option<String>,
    pub web3_provider: String,
    pub ipfs_provider: Option<String>,
}

impl ArcSettings {
    pub fn from_env(network: Network) -> Result<Self, ArcError> {
        Self::from_lookup(network, |key| std::env::var(key).ok())
    }

    /// Builds the settings from any key/value source. Only a local ganache
    /// deployment has usable defaults.
    pub fn from_lookup<F>(network: Network, lookup: F) -> Result<Self, ArcError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let local = network == Network::Ganache;
        let with_default = |key: &str, default: &str| {
            lookup(key).or_else(|| local.then(|| default.to_string()))
        };

        let graphql_http_provider = with_default(
            "ARC_GRAPHQLHTTPPROVIDER",
            "http://127.0.0.1:8000/subgraphs/name/daostack",
        )
        .ok_or(ArcError::MissingSetting(
            utils::errors::GRAPHQL_HTTP_PROVIDER_NOT_SET,
        ))?;
        let web3_provider = with_default("ARC_WEB3PROVIDER", "http://127.0.0.1:8545")
            .ok_or(ArcError::MissingSetting(utils::errors::WEB3_PROVIDER_NOT_SET))?;

        Ok(Self {
            network,
            graphql_http_provider,
            graphql_ws_provider: with_default(
                "ARC_GRAPHQLWSPROVIDER",
                "ws://127.0.0.1:8001/subgraphs/name/daostack",
            ),
            web3_provider,
            ipfs_provider: with_default("ARC_IPFSPROVIDER", "http://127.0.0.1:5001/api/v0"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn network_aliases() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Main);
        assert_eq!("private".parse::<Network>().unwrap(), Network::Ganache);
        assert_eq!(" XDAI ".parse::<Network>().unwrap(), Network::Xdai);
        assert!("kovan".parse::<Network>().is_err());
    }

    #[test]
    fn chain_ids_round_trip() {
        for network in [Network::Main, Network::Rinkeby, Network::Xdai, Network::Ganache] {
            assert_eq!(Network::from_chain_id(network.chain_id()), Some(network));
        }
    }

    #[test]
    fn ganache_has_local_defaults() {
        let settings = ArcSettings::from_lookup(Network::Ganache, |_| None).unwrap();
        assert_eq!(settings.web3_provider, "http://127.0.0.1:8545");
        assert!(settings.graphql_ws_provider.is_some());
    }

    #[test]
    fn public_networks_need_explicit_endpoints() {
        let err = ArcSettings::from_lookup(Network::Rinkeby, |_| None).unwrap_err();
        assert!(matches!(err, ArcError::MissingSetting(_)));

        let env: HashMap<&str, &str> = HashMap::from([
            ("ARC_GRAPHQLHTTPPROVIDER", "https://subgraph.example/rinkeby"),
            ("ARC_WEB3PROVIDER", "wss://rpc.example/rinkeby"),
        ]);
        let settings =
            ArcSettings::from_lookup(Network::Rinkeby, |key| env.get(key).map(|v| v.to_string()))
                .unwrap();
        assert_eq!(settings.graphql_http_provider, "https://subgraph.example/rinkeby");
        assert_eq!(settings.graphql_ws_provider, None);
    }
}
