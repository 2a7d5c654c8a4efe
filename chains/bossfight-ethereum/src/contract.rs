#![allow(missing_docs)]

use ethers::contract::abigen;

abigen!(
    GameContract,
    r#"[
        function bossHit(address account) external
        function rewardToken(address account, uint256 amount) external
        function owner() external view returns (address)
    ]"#
);
