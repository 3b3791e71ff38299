//! ABI fragments of the DAOstack contracts the dashboard reads from and writes to.
#![allow(clippy::too_many_arguments)]

use alloy::sol;

pub const GENESIS_PROTOCOL: &str = "GenesisProtocol";
pub const CONTRIBUTION_REWARD: &str = "ContributionReward";
pub const REDEEMER: &str = "Redeemer";
pub const GEN_TOKEN: &str = "GEN";

sol! {
    #[sol(rpc)]
    interface GenesisProtocol {
        event NewProposal(bytes32 indexed _proposalId, address indexed _organization, uint256 _numOfChoices, address _proposer, bytes32 _paramsHash);
        event ExecuteProposal(bytes32 indexed _proposalId, address indexed _organization, uint256 _decision, uint256 _totalReputation);
        event GPExecuteProposal(bytes32 indexed _proposalId, uint8 _executionState);
        event VoteProposal(bytes32 indexed _proposalId, address indexed _organization, address indexed _voter, uint256 _vote, uint256 _reputation);
        event Stake(bytes32 indexed _proposalId, address indexed _organization, address indexed _staker, uint256 _vote, uint256 _amount);
        event Redeem(bytes32 indexed _proposalId, address indexed _organization, address indexed _beneficiary, uint256 _amount);
        event RedeemDaoBounty(bytes32 indexed _proposalId, address indexed _organization, address indexed _beneficiary, uint256 _amount);
        event RedeemReputation(bytes32 indexed _proposalId, address indexed _organization, address indexed _beneficiary, uint256 _amount);

        function vote(bytes32 _proposalId, uint256 _vote, uint256 _amount, address _voter) external returns (bool);
        function stake(bytes32 _proposalId, uint256 _vote, uint256 _amount) external returns (bool);
        function execute(bytes32 _proposalId) external returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    interface ContributionReward {
        event NewContributionProposal(address indexed _avatar, bytes32 indexed _proposalId, address indexed _intVoteInterface, string _descriptionHash, int256 _reputationChange, uint256[5] _rewards, address _externalToken, address _beneficiary);
        event RedeemReputation(address indexed _avatar, bytes32 indexed _proposalId, address indexed _beneficiary, int256 _amount);
        event RedeemEther(address indexed _avatar, bytes32 indexed _proposalId, address indexed _beneficiary, uint256 _amount);

        function proposeContributionReward(address _avatar, string _descriptionHash, int256 _reputationChange, uint256[5] _rewards, address _externalToken, address _beneficiary) external returns (bytes32);
    }
}

sol! {
    #[sol(rpc)]
    interface Redeemer {
        function redeem(bytes32 _proposalId, address _avatar, address _beneficiary) external;
    }
}

sol! {
    #[sol(rpc)]
    interface Erc20 {
        function balanceOf(address _owner) external view returns (uint256);
        function allowance(address _owner, address _spender) external view returns (uint256);
        function approve(address _spender, uint256 _value) external returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    interface Reputation {
        event Mint(address indexed _to, uint256 _amount);
        event Burn(address indexed _from, uint256 _amount);
    }
}
