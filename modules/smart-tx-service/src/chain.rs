//! On-chain queries keyed by chain id.

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{
    Address, Block, BlockId, BlockNumber, Transaction, TransactionReceipt, H256, U256, U64,
};
use std::collections::HashMap;

use crate::error::{Result, SmartTxError};
use crate::store::ChainId;

#[async_trait]
pub trait ChainQuery: Send + Sync {
    async fn get_balance(&self, chain: &ChainId, address: &str) -> Result<U256>;

    async fn get_transaction_receipt(
        &self,
        chain: &ChainId,
        hash: &str,
    ) -> Result<Option<TransactionReceipt>>;

    async fn get_transaction_by_hash(&self, chain: &ChainId, hash: &str)
    -> Result<Option<Transaction>>;

    async fn get_block_by_number(&self, chain: &ChainId, number: U64) -> Result<Option<Block<H256>>>;

    /// Pending-inclusive transaction count of `address`
    async fn get_transaction_count(&self, chain: &ChainId, address: &str) -> Result<U256>;
}

/// JSON-RPC backed chain queries, one HTTP provider per chain
pub struct EthersChainQuery {
    providers: HashMap<ChainId, Provider<Http>>,
}

impl EthersChainQuery {
    pub fn new(rpc_urls: &HashMap<ChainId, String>) -> Result<Self> {
        let mut providers = HashMap::new();
        for (chain, url) in rpc_urls {
            let provider = Provider::<Http>::try_from(url.as_str())
                .map_err(|e| SmartTxError::Chain(format!("Invalid RPC URL for {}: {}", chain, e)))?;
            providers.insert(chain.clone(), provider);
        }
        Ok(Self { providers })
    }

    fn provider(&self, chain: &ChainId) -> Result<&Provider<Http>> {
        self.providers
            .get(chain)
            .ok_or_else(|| SmartTxError::Chain(format!("No RPC endpoint for chain {}", chain)))
    }
}

fn parse_address(address: &str) -> Result<Address> {
    address
        .parse::<Address>()
        .map_err(|e| SmartTxError::Chain(format!("Invalid address {}: {}", address, e)))
}

fn parse_hash(hash: &str) -> Result<H256> {
    hash.parse::<H256>()
        .map_err(|e| SmartTxError::Chain(format!("Invalid transaction hash {}: {}", hash, e)))
}

#[async_trait]
impl ChainQuery for EthersChainQuery {
    async fn get_balance(&self, chain: &ChainId, address: &str) -> Result<U256> {
        self.provider(chain)?
            .get_balance(parse_address(address)?, None)
            .await
            .map_err(|e| SmartTxError::Chain(e.to_string()))
    }

    async fn get_transaction_receipt(
        &self,
        chain: &ChainId,
        hash: &str,
    ) -> Result<Option<TransactionReceipt>> {
        self.provider(chain)?
            .get_transaction_receipt(parse_hash(hash)?)
            .await
            .map_err(|e| SmartTxError::Chain(e.to_string()))
    }

    async fn get_transaction_by_hash(
        &self,
        chain: &ChainId,
        hash: &str,
    ) -> Result<Option<Transaction>> {
        self.provider(chain)?
            .get_transaction(parse_hash(hash)?)
            .await
            .map_err(|e| SmartTxError::Chain(e.to_string()))
    }

    async fn get_block_by_number(&self, chain: &ChainId, number: U64) -> Result<Option<Block<H256>>> {
        self.provider(chain)?
            .get_block(BlockId::Number(BlockNumber::Number(number)))
            .await
            .map_err(|e| SmartTxError::Chain(e.to_string()))
    }

    async fn get_transaction_count(&self, chain: &ChainId, address: &str) -> Result<U256> {
        self.provider(chain)?
            .get_transaction_count(
                parse_address(address)?,
                Some(BlockId::Number(BlockNumber::Pending)),
            )
            .await
            .map_err(|e| SmartTxError::Chain(e.to_string()))
    }
}
