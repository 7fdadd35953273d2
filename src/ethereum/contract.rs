//! Contracts the farm talks to on Base.

use super::abi::AbiItem;

pub const BASE_CHAIN_ID: u64 = 8453;
pub const BASE_PUBLIC_RPC_URL: &str = "https://mainnet.base.org";
pub const BASE_EXPLORER_URL: &str = "https://basescan.org";

/// Clone factory: `createClone()` deploys a pinger clone and indexes its
/// address in `topics[1]` of the emitted log.
pub const FACTORY_ADDRESS: &str = "0x0ae36d90d4e295a4b87274eec0c1520fd5f6f842";

/// NFT collection factory: `mint(string,uint256)`.
pub const NFT_FACTORY_ADDRESS: &str = "0x5A5aea5bF11BaaF2f3f420C8e694425aC3590c8C";

pub fn factory_abi() -> Vec<AbiItem> {
    vec![AbiItem::function("createClone", &[], "nonpayable")]
}

pub fn pinger_abi() -> Vec<AbiItem> {
    vec![
        AbiItem::constructor(&[]),
        AbiItem::function("ping", &[], "nonpayable"),
        AbiItem::function("counter", &[], "view"),
    ]
}

pub fn nft_factory_abi() -> Vec<AbiItem> {
    vec![AbiItem::function(
        "mint",
        &[("handle", "string"), ("amount", "uint256")],
        "nonpayable",
    )]
}
