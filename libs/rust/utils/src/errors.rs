//env
pub const GRAPHQL_HTTP_PROVIDER_NOT_SET: &str = "ARC_GRAPHQLHTTPPROVIDER not set!";
pub const WEB3_PROVIDER_NOT_SET: &str = "ARC_WEB3PROVIDER not set!";

//redis
pub const REDIS_CONNECTION_FAILED: &str = "Failed to connect to Redis";

//arc
pub const ARC_NOT_INITIALIZED: &str = "Arc client not initialized";
pub const WALLET_NOT_ENABLED: &str = "No wallet provider enabled";
pub const CONTRACT_NOT_FOUND_ERROR: &str = "Contract not found in contract infos";
pub const PROPOSAL_NOT_FOUND_ERROR: &str = "Proposal not found";
