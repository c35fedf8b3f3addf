use crate::blockchain::RpcGateway;
use crate::contracts::erc20::ERC20Contract;
use crate::errors::EngineResult;
use crate::retry::random_between;
use crate::submitter::{SkipReason, TransactionOutcome, TransactionSubmitter};
use crate::transaction_builder::TxCall;
use crate::wallet::Wallet;
use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

/// Balance, allowance and approval helpers for one wallet.
pub struct TokenOperations {
    wallet: Arc<Wallet>,
    gateway: Arc<dyn RpcGateway>,
    submitter: Arc<TransactionSubmitter>,
    cooldown: (Duration, Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub balance: U256,
    pub decimals: u8,
    pub symbol: String,
}

impl TokenInfo {
    pub fn display_amount(&self, amount: U256) -> String {
        match format_units(amount, self.decimals) {
            Ok(formatted) => format!("{} {}", formatted, self.symbol),
            Err(_) => format!("{} (raw) {}", amount, self.symbol),
        }
    }
}

impl TokenOperations {
    pub fn new(
        wallet: Arc<Wallet>,
        gateway: Arc<dyn RpcGateway>,
        submitter: Arc<TransactionSubmitter>,
        cooldown_min: Duration,
        cooldown_max: Duration,
    ) -> Self {
        Self {
            wallet,
            gateway,
            submitter,
            cooldown: (cooldown_min, cooldown_max),
        }
    }

    fn token(&self, token: Address) -> ERC20Contract {
        ERC20Contract::new(token, self.gateway.clone())
    }

    /// Native balance when `token` is `None`, otherwise the ERC-20 balance.
    pub async fn get_balance(&self, token: Option<Address>) -> EngineResult<U256> {
        match token {
            None => self.gateway.balance(self.wallet.address()).await,
            Some(token) => self.token(token).balance_of(self.wallet.address()).await,
        }
    }

    pub async fn get_allowance(&self, token: Address, spender: Address) -> EngineResult<U256> {
        self.token(token)
            .allowance(self.wallet.address(), spender)
            .await
    }

    pub async fn token_info(&self, token: Address) -> EngineResult<TokenInfo> {
        let contract = self.token(token);
        let (balance, decimals, symbol) = tokio::try_join!(
            contract.balance_of(self.wallet.address()),
            contract.decimals(),
            contract.symbol(),
        )?;

        Ok(TokenInfo {
            balance,
            decimals,
            symbol,
        })
    }

    /// Approve `spender` for `amount` unless there is nothing to approve or
    /// the current allowance already covers the whole balance.
    pub async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> EngineResult<TransactionOutcome> {
        let label = self.wallet.label();
        let info = self.token_info(token).await?;

        if info.balance.is_zero() {
            info!(label, "Your {} is 0", info.symbol);
            return Ok(TransactionOutcome::Skipped(SkipReason::ZeroBalance));
        }

        let allowance = self.get_allowance(token, spender).await?;
        if allowance >= info.balance {
            info!(label, "{} already approved", info.display_amount(info.balance));
            return Ok(TransactionOutcome::Skipped(SkipReason::AlreadyApproved));
        }

        info!(
            label,
            %spender,
            "Approving {}",
            info.display_amount(amount)
        );
        let call = TxCall::contract_call(token, ERC20Contract::approve_calldata(spender, amount));
        let outcome = self
            .submitter
            .submit(call, &format!("{} Approve {}", label, info.symbol))
            .await;

        sleep(random_between(self.cooldown.0, self.cooldown.1)).await;
        Ok(outcome)
    }
}
