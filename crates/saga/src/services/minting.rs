//! Chain-minting service trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::SagaError;

/// A contract call signature candidate for minting.
///
/// Contracts differ in which mint entry point they expose; the coordinator
/// tries these in a fixed order until one succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MintMethod {
    /// `mintTo(recipient, uri)` shape.
    MintToWithUri,
    /// `safeMint(recipient, uri)` shape.
    SafeMint,
}

impl MintMethod {
    /// Candidate methods in fallback order. The first success wins.
    pub const CANDIDATES: [MintMethod; 2] = [MintMethod::MintToWithUri, MintMethod::SafeMint];

    /// Returns the method name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MintMethod::MintToWithUri => "mint_to_with_uri",
            MintMethod::SafeMint => "safe_mint",
        }
    }
}

impl std::fmt::Display for MintMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a successful mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    /// Token identifier assigned on chain.
    pub token_id: String,
    /// Transaction hash of the mint.
    pub transaction_hash: String,
}

/// One recorded mint call, for test inspection.
#[derive(Debug, Clone)]
pub struct MintCall {
    pub method: MintMethod,
    pub contract_address: String,
    pub recipient: String,
    pub metadata_url: String,
}

/// Trait for chain-minting services.
#[async_trait]
pub trait MintingService: Send + Sync {
    /// Returns true if minting credentials are configured.
    fn is_configured(&self) -> bool;

    /// Attempts one mint with a specific contract call signature.
    async fn mint(
        &self,
        method: MintMethod,
        contract_address: &str,
        recipient: &str,
        metadata_url: &str,
    ) -> Result<MintReceipt, SagaError>;
}

#[derive(Debug)]
struct InMemoryMintingState {
    calls: Vec<MintCall>,
    failing_methods: HashSet<MintMethod>,
    next_token: u64,
    configured: bool,
}

impl Default for InMemoryMintingState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            failing_methods: HashSet::new(),
            next_token: 0,
            configured: true,
        }
    }
}

/// In-memory minting service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMintingService {
    state: Arc<RwLock<InMemoryMintingState>>,
}

impl InMemoryMintingService {
    /// Creates a new in-memory minting service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles whether the service reports itself as configured.
    pub fn set_configured(&self, configured: bool) {
        self.state.write().unwrap().configured = configured;
    }

    /// Makes a specific call signature fail.
    pub fn set_fail_method(&self, method: MintMethod, fail: bool) {
        let mut state = self.state.write().unwrap();
        if fail {
            state.failing_methods.insert(method);
        } else {
            state.failing_methods.remove(&method);
        }
    }

    /// Returns the number of mint calls attempted.
    pub fn call_count(&self) -> usize {
        self.state.read().unwrap().calls.len()
    }

    /// Returns a copy of all recorded calls.
    pub fn calls(&self) -> Vec<MintCall> {
        self.state.read().unwrap().calls.clone()
    }
}

#[async_trait]
impl MintingService for InMemoryMintingService {
    fn is_configured(&self) -> bool {
        self.state.read().unwrap().configured
    }

    async fn mint(
        &self,
        method: MintMethod,
        contract_address: &str,
        recipient: &str,
        metadata_url: &str,
    ) -> Result<MintReceipt, SagaError> {
        let mut state = self.state.write().unwrap();
        state.calls.push(MintCall {
            method,
            contract_address: contract_address.to_string(),
            recipient: recipient.to_string(),
            metadata_url: metadata_url.to_string(),
        });

        if state.failing_methods.contains(&method) {
            return Err(SagaError::Minting(format!(
                "contract reverted on {method}"
            )));
        }

        state.next_token += 1;
        Ok(MintReceipt {
            token_id: state.next_token.to_string(),
            transaction_hash: format!("0x{:064x}", state.next_token),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mint_records_call_and_returns_receipt() {
        let service = InMemoryMintingService::new();

        let receipt = service
            .mint(MintMethod::MintToWithUri, "0xabc", "0xdef", "https://m/1")
            .await
            .unwrap();

        assert_eq!(receipt.token_id, "1");
        assert_eq!(service.call_count(), 1);
        assert_eq!(service.calls()[0].method, MintMethod::MintToWithUri);
    }

    #[tokio::test]
    async fn test_failing_method_reverts() {
        let service = InMemoryMintingService::new();
        service.set_fail_method(MintMethod::MintToWithUri, true);

        let result = service
            .mint(MintMethod::MintToWithUri, "0xabc", "0xdef", "https://m/1")
            .await;
        assert!(matches!(result, Err(SagaError::Minting(_))));

        let ok = service
            .mint(MintMethod::SafeMint, "0xabc", "0xdef", "https://m/1")
            .await;
        assert!(ok.is_ok());
    }

    #[test]
    fn test_candidate_order_is_deterministic() {
        assert_eq!(
            MintMethod::CANDIDATES,
            [MintMethod::MintToWithUri, MintMethod::SafeMint]
        );
    }
}
