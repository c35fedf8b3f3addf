use crate::blockchain::RpcGateway;
use crate::errors::{EngineError, EngineResult};
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy::sol;
use alloy::sol_types::SolCall;
use std::sync::Arc;

sol! {
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }
}

/// Strictly decode the return data of `C` read from `token`.
fn decode_returns<C: SolCall>(token: Address, result: &[u8]) -> EngineResult<C::Return> {
    C::abi_decode_returns_validate(result)
        .map_err(|e| EngineError::Contract(format!("{} on {}: {}", C::SIGNATURE, token, e)))
}

#[derive(Clone)]
pub struct ERC20Contract {
    address: Address,
    gateway: Arc<dyn RpcGateway>,
}

impl ERC20Contract {
    pub fn new(address: Address, gateway: Arc<dyn RpcGateway>) -> Self {
        Self { address, gateway }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn read(&self, data: Vec<u8>) -> EngineResult<Bytes> {
        self.gateway
            .call(TransactionRequest {
                to: Some(TxKind::Call(self.address)),
                input: TransactionInput::new(Bytes::from(data)),
                ..Default::default()
            })
            .await
    }

    pub async fn balance_of(&self, account: Address) -> EngineResult<U256> {
        let call = IERC20::balanceOfCall { account };
        let result = self.read(call.abi_encode()).await?;

        decode_returns::<IERC20::balanceOfCall>(self.address, &result)
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> EngineResult<U256> {
        let call = IERC20::allowanceCall { owner, spender };
        let result = self.read(call.abi_encode()).await?;

        decode_returns::<IERC20::allowanceCall>(self.address, &result)
    }

    pub async fn decimals(&self) -> EngineResult<u8> {
        let call = IERC20::decimalsCall {};
        let result = self.read(call.abi_encode()).await?;

        decode_returns::<IERC20::decimalsCall>(self.address, &result)
    }

    pub async fn symbol(&self) -> EngineResult<String> {
        let call = IERC20::symbolCall {};
        let result = self.read(call.abi_encode()).await?;

        decode_returns::<IERC20::symbolCall>(self.address, &result)
    }

    /// Calldata for `approve(spender, amount)`.
    pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
        IERC20::approveCall { spender, amount }.abi_encode().into()
    }
}
