//! [`ChainReader`] and [`ChainWriter`] over an alloy JSON-RPC provider.

use alloy::{
    network::ReceiptResponse,
    primitives::{B256, FixedBytes, U256},
    providers::{PendingTransactionBuilder, PendingTransactionError, Provider},
};

use crate::{
    chain::{ChainReader, ChainWriter, TransactionReceipt},
    networks::evm::EvmAddress,
    schemes::exact_evm::ExactEvmPayload,
};

alloy::sol! {
    #[sol(rpc)]
    interface IEIP3009 {
        function balanceOf(address owner) external view returns (uint256);
        function name() external view returns (string);
        function version() external view returns (string);
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),
    #[error("Pending transaction failed: {0}")]
    Pending(#[from] PendingTransactionError),
}

/// Chain client backed by any alloy [`Provider`].
///
/// Settlement sends transactions through the provider, so it must carry a wallet filler
/// for the facilitator's account.
#[derive(Debug, Clone)]
pub struct RpcChainClient<P> {
    provider: P,
}

impl<P: Provider> RpcChainClient<P> {
    pub fn new(provider: P) -> Self {
        RpcChainClient { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: Provider> ChainReader for RpcChainClient<P> {
    type Error = ChainError;

    async fn token_balance(
        &self,
        asset: EvmAddress,
        owner: EvmAddress,
    ) -> Result<U256, ChainError> {
        let contract = IEIP3009::new(asset.0, &self.provider);
        Ok(contract.balanceOf(owner.0).call().await?)
    }

    async fn token_name(&self, asset: EvmAddress) -> Result<String, ChainError> {
        let contract = IEIP3009::new(asset.0, &self.provider);
        Ok(contract.name().call().await?)
    }

    async fn token_version(&self, asset: EvmAddress) -> Result<String, ChainError> {
        let contract = IEIP3009::new(asset.0, &self.provider);
        Ok(contract.version().call().await?)
    }
}

impl<P: Provider> ChainWriter for RpcChainClient<P> {
    async fn transfer_with_authorization(
        &self,
        asset: EvmAddress,
        payload: &ExactEvmPayload,
    ) -> Result<B256, ChainError> {
        let contract = IEIP3009::new(asset.0, &self.provider);
        let authorization = &payload.authorization;
        let signature = &payload.signature.0;

        let pending = contract
            .transferWithAuthorization(
                authorization.from.0,
                authorization.to.0,
                authorization.value.value(),
                U256::from(authorization.valid_after.0),
                U256::from(authorization.valid_before.0),
                FixedBytes(authorization.nonce.0),
                27 + signature.v() as u8,
                signature.r().to_be_bytes::<32>().into(),
                signature.s().to_be_bytes::<32>().into(),
            )
            .send()
            .await?;

        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        transaction_hash: B256,
    ) -> Result<TransactionReceipt, ChainError> {
        let receipt =
            PendingTransactionBuilder::new(self.provider.root().clone(), transaction_hash)
                .get_receipt()
                .await?;

        Ok(TransactionReceipt {
            transaction_hash: receipt.transaction_hash(),
            success: receipt.status(),
        })
    }
}
