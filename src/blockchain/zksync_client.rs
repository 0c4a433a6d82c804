// src/blockchain/zksync_client.rs
//! zkSync blockchain client implementation.
//!
//! Provides a high-level interface for interacting with zkSync Era blockchain,
//! including transaction sending and wallet management.
//! Errors are flattened to `Send + Sync` boxes so callers can hold them across
//! await points.

use ethers_contract::BaseContract;
use ethers_core::{
    abi::{Abi, Tokenize},
    types::{Address, TransactionReceipt, H256, U256},
};
use k256::{ecdsa::SigningKey, elliptic_curve::generic_array::GenericArray};
use std::{error::Error, sync::Arc};
use zksync_web3_rs::{
    contract::Contract,
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{Signer, Wallet},
    zks_wallet::ZKSWallet,
};

pub type ClientError = Box<dyn Error + Send + Sync>;

/// Failure of [`ZkSyncClient::send_transaction`], split by how far the
/// transaction got.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    /// The call could not be built (bad address, ABI or arguments).
    #[error("invalid contract call: {0}")]
    Invalid(String),

    /// The node did not accept the transaction.
    #[error("transaction not sent: {0}")]
    NotSent(String),

    /// The node accepted the transaction but it left the mempool unmined.
    #[error("transaction 0x{0:x} was dropped before inclusion")]
    Dropped(H256),

    /// The transaction was sent but its fate could not be observed.
    #[error("transaction 0x{tx_hash:x} sent but not confirmed: {reason}")]
    Unconfirmed { tx_hash: H256, reason: String },
}

/// Gas limit attached to every state-changing call.
const GAS_LIMIT: u64 = 3_000_000;

/// zkSync blockchain client for managing wallet and contract interactions.
#[derive(Clone)]
pub struct ZkSyncClient {
    /// zkSync wallet with signing capabilities
    wallet: ZKSWallet<SignerMiddleware<Arc<Provider<Http>>, Wallet<SigningKey>>, SigningKey>,
}

impl ZkSyncClient {
    /// Creates a new zkSync client instance.
    ///
    /// # Arguments
    /// * `rpc_url` - zkSync RPC endpoint URL
    /// * `private_key` - Hex-encoded private key (with or without 0x prefix)
    ///
    /// # Errors
    /// Returns error if:
    /// - RPC connection fails
    /// - Private key is invalid
    /// - Chain ID cannot be retrieved
    /// - Wallet initialization fails
    pub async fn new(rpc_url: &str, private_key: &str) -> Result<Self, ClientError> {
        let provider = Arc::new(Provider::<Http>::try_from(rpc_url).map_err(|e| e.to_string())?);
        let private_key_bytes = hex::decode(private_key.trim_start_matches("0x"))?;
        if private_key_bytes.len() != 32 {
            return Err("Private key must be 32 bytes".into());
        }
        let signing_key = SigningKey::from_bytes(GenericArray::from_slice(&private_key_bytes))
            .map_err(|e| e.to_string())?;

        // Create Ethereum wallet with chain ID
        let chain_id = provider.get_chainid().await.map_err(|e| e.to_string())?.as_u64();
        let l2_wallet = Wallet::from(signing_key).with_chain_id(chain_id);

        let signer_middleware = SignerMiddleware::new(provider, l2_wallet.clone());

        let wallet = ZKSWallet::new(
            l2_wallet,
            None,                    // L1 wallet
            Some(signer_middleware), // era provider
            None,                    // eth provider
        )
        .map_err(|e| e.to_string())?;

        Ok(Self { wallet })
    }

    /// Gets the wallet's L2 (zkSync) address.
    pub fn get_address(&self) -> Address {
        self.wallet.l2_address()
    }

    /// Sends a transaction to a smart contract and waits for it to be mined.
    ///
    /// # Arguments
    /// * `contract_address` - Address of the target contract
    /// * `abi` - Contract ABI bytes
    /// * `method` - Method name to call
    /// * `params` - Method parameters
    ///
    /// # Returns
    /// Receipt of the mined transaction. Its `status` still has to be checked
    /// for a revert.
    pub async fn send_transaction(
        &self,
        contract_address: &str,
        abi: &[u8],
        method: &str,
        params: impl Tokenize + Send,
    ) -> Result<TransactionReceipt, TxError> {
        let abi = Abi::load(abi).map_err(|e| TxError::Invalid(e.to_string()))?;
        let base_contract = BaseContract::from(abi);
        let address: Address = contract_address
            .parse()
            .map_err(|e| TxError::Invalid(format!("Invalid contract address: {}", e)))?;

        let provider = self
            .wallet
            .get_era_provider()
            .map_err(|e| TxError::NotSent(e.to_string()))?
            .clone();
        let contract = Contract::new(address, base_contract, provider);

        let call = contract
            .method::<_, H256>(method, params)
            .map_err(|e| TxError::Invalid(e.to_string()))?
            .gas(U256::from(GAS_LIMIT));
        let pending = call.send().await.map_err(|e| TxError::NotSent(e.to_string()))?;

        let tx_hash = pending.tx_hash();
        log::debug!("sent {} as 0x{:x}, awaiting receipt", method, tx_hash);
        match pending.await {
            Ok(Some(receipt)) => Ok(receipt),
            Ok(None) => Err(TxError::Dropped(tx_hash)),
            Err(e) => Err(TxError::Unconfirmed { tx_hash, reason: e.to_string() }),
        }
    }
}
